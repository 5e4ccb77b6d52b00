// Authentication guards

use crate::{AuthError, Identity, IdentityResolver, Result, TokenService};
use async_trait::async_trait;
use psylab_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use psylab_session::{Role, SessionData, SessionExt};
use std::sync::Arc;

/// Access to the identity an [`AuthGuard`] established.
pub trait IdentityExt {
    fn identity(&self) -> Option<&Identity>;
}

impl IdentityExt for HttpRequest {
    fn identity(&self) -> Option<&Identity> {
        self.extensions.get::<Identity>()
    }
}

/// Route guard that re-derives identity on every request.
///
/// The token stored in the session is verified, the identity is reloaded
/// through the [`IdentityResolver`] and its current role is checked. The
/// role and identity fields cached in the cookie are never trusted; they
/// are overwritten with the freshly loaded values for the handler.
///
/// Must run inside the session middleware.
#[derive(Clone)]
pub struct AuthGuard {
    tokens: Arc<TokenService>,
    resolver: Arc<dyn IdentityResolver>,
    role: Option<Role>,
}

impl AuthGuard {
    /// Any authenticated identity.
    pub fn any(tokens: Arc<TokenService>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            tokens,
            resolver,
            role: None,
        }
    }

    /// Authenticated subjects only.
    pub fn subject(tokens: Arc<TokenService>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self::any(tokens, resolver).with_role(Role::Subject)
    }

    /// Authenticated experimenters only.
    pub fn experimenter(tokens: Arc<TokenService>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self::any(tokens, resolver).with_role(Role::Experimenter)
    }

    fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn required_role(&self) -> Option<Role> {
        self.role
    }

    /// Resolve and check the identity behind a session.
    pub async fn authorize(&self, session: &SessionData) -> Result<Identity> {
        let token = session
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.tokens.verify(token)?;
        let identity = self
            .resolver
            .find_by_id(&claims.id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(claims.id.clone()))?;

        if let Some(role) = self.role
            && identity.role != role
        {
            tracing::info!(required = %role, actual = %identity.role, "Role mismatch");
            return Err(AuthError::Forbidden);
        }

        Ok(identity)
    }
}

fn refresh(session: &mut SessionData, identity: &Identity) {
    session.id = Some(identity.id.clone());
    session.username = Some(identity.username.clone());
    session.email = Some(identity.email.clone());
    session.role = Some(identity.role);
}

#[async_trait]
impl Middleware for AuthGuard {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> std::result::Result<HttpResponse, Error> {
        let session = req.session().cloned().unwrap_or_default();

        let identity = match self.authorize(&session).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(path = %req.path, error = %e, "Authentication failed");
                return Err(e.into());
            }
        };

        tracing::debug!(user = %identity.id, role = %identity.role, "Authenticated");
        match req.session_mut() {
            Some(session) => refresh(session, &identity),
            None => {
                let mut session = session;
                refresh(&mut session, &identity);
                req.extensions.insert(session);
            }
        }
        req.extensions.insert(identity);

        next(req).await
    }
}
