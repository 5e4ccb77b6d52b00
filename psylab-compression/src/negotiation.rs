//! Accept-Encoding negotiation.
//!
//! Parses the header into weighted preferences and picks one coding:
//!
//! 1. Each comma-separated directive must match `coding [; q=weight]`.
//!    Anything else is skipped. Weights that do not parse count as `1`,
//!    and every weight is clamped to `[0, 1]`.
//! 2. `*` assigns its weight to each wildcard coding the header did not
//!    name explicitly, regardless of directive order.
//! 3. Accepted codings are grouped by weight, highest first. Within a
//!    group the server's own preference order breaks ties, so
//!    `gzip;q=0.5, br;q=0.5` yields `br` under the default order.
//! 4. If nothing matches and the client sent `identity;q=0`, negotiation
//!    fails with a 406-style error; otherwise the result is identity.

use crate::{CompressionAlgorithm, CompressionError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(gzip|compress|deflate|br|identity|\*)\s*(?:;\s*q\s*=\s*([^\s;,]*))?\s*$")
        .expect("directive pattern is valid")
});

/// A content coding token understood by the negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coding {
    Gzip,
    Deflate,
    Br,
    /// Recognised, but not something this server can produce.
    Compress,
    Identity,
}

impl Coding {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gzip" => Some(Coding::Gzip),
            "deflate" => Some(Coding::Deflate),
            "br" => Some(Coding::Br),
            "compress" => Some(Coding::Compress),
            "identity" => Some(Coding::Identity),
            _ => None,
        }
    }

    /// The algorithm producing this coding, if we implement it.
    pub fn algorithm(&self) -> Option<CompressionAlgorithm> {
        match self {
            Coding::Gzip => Some(CompressionAlgorithm::Gzip),
            Coding::Deflate => Some(CompressionAlgorithm::Deflate),
            Coding::Br => Some(CompressionAlgorithm::Brotli),
            Coding::Compress | Coding::Identity => None,
        }
    }

    fn is_acceptable(&self) -> bool {
        *self == Coding::Identity || self.algorithm().is_some()
    }
}

impl From<CompressionAlgorithm> for Coding {
    fn from(algorithm: CompressionAlgorithm) -> Self {
        match algorithm {
            CompressionAlgorithm::Gzip => Coding::Gzip,
            CompressionAlgorithm::Deflate => Coding::Deflate,
            CompressionAlgorithm::Brotli => Coding::Br,
        }
    }
}

/// Client preferences parsed from one Accept-Encoding header.
///
/// Keeps first-seen order; a later explicit directive for the same coding
/// replaces the earlier weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingPreferences {
    weights: Vec<(Coding, f64)>,
}

impl EncodingPreferences {
    pub fn weight(&self, coding: Coding) -> Option<f64> {
        self.weights
            .iter()
            .find(|(c, _)| *c == coding)
            .map(|(_, w)| *w)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Coding, f64)> + '_ {
        self.weights.iter().copied()
    }

    fn set(&mut self, coding: Coding, weight: f64) {
        match self.weights.iter_mut().find(|(c, _)| *c == coding) {
            Some(entry) => entry.1 = weight,
            None => self.weights.push((coding, weight)),
        }
    }
}

/// Outcome of negotiation for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionDecision {
    /// Send the body as is.
    Identity,
    /// Encode the body with this algorithm.
    Encode(CompressionAlgorithm),
}

impl CompressionDecision {
    pub fn encoding_name(&self) -> &'static str {
        match self {
            CompressionDecision::Identity => "identity",
            CompressionDecision::Encode(algorithm) => algorithm.encoding_name(),
        }
    }
}

impl fmt::Display for CompressionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding_name())
    }
}

/// Selects a response coding from an Accept-Encoding header.
#[derive(Debug, Clone)]
pub struct EncodingNegotiator {
    preferred: Vec<CompressionAlgorithm>,
    wildcard: Option<Vec<Coding>>,
}

impl Default for EncodingNegotiator {
    fn default() -> Self {
        Self::new(CompressionAlgorithm::ALL.to_vec())
    }
}

impl EncodingNegotiator {
    /// Create a negotiator with the given server preference order.
    pub fn new(preferred: Vec<CompressionAlgorithm>) -> Self {
        let mut deduped = Vec::with_capacity(preferred.len());
        for algorithm in preferred {
            if !deduped.contains(&algorithm) {
                deduped.push(algorithm);
            }
        }
        Self {
            preferred: deduped,
            wildcard: None,
        }
    }

    /// Codings a `*` directive expands to.
    ///
    /// Without this call `*` expands to the full preference order, brotli
    /// included (`br`, `gzip`, `deflate` by default), not to a fixed
    /// gzip/deflate set. So `gzip;q=0.5, *` selects `br` by default, and
    /// `deflate` once the wildcard is narrowed to `[Gzip, Deflate]`.
    pub fn with_wildcard(mut self, codings: Vec<Coding>) -> Self {
        self.wildcard = Some(codings);
        self
    }

    pub fn preferred(&self) -> &[CompressionAlgorithm] {
        &self.preferred
    }

    fn wildcard_codings(&self) -> Vec<Coding> {
        match &self.wildcard {
            Some(codings) => codings.clone(),
            None => self.preferred.iter().map(|a| Coding::from(*a)).collect(),
        }
    }

    /// Parse a header value; an absent header means `*`.
    pub fn parse(&self, accept_encoding: Option<&str>) -> EncodingPreferences {
        let header = accept_encoding.unwrap_or("*");
        let mut prefs = EncodingPreferences::default();
        let mut wildcard_weight = None;

        for directive in header.split(',') {
            let Some(captures) = DIRECTIVE.captures(directive) else {
                continue;
            };
            let token = &captures[1];
            let weight = parse_weight(captures.get(2).map(|m| m.as_str()));

            if token == "*" {
                wildcard_weight = Some(weight);
                continue;
            }
            if let Some(coding) = Coding::from_token(token) {
                prefs.set(coding, weight);
            }
        }

        // Expanded last so it never overrides an explicitly named coding.
        if let Some(weight) = wildcard_weight {
            for coding in self.wildcard_codings() {
                if prefs.weight(coding).is_none() {
                    prefs.set(coding, weight);
                }
            }
        }

        prefs
    }

    /// Choose a coding for `accept_encoding`.
    pub fn negotiate(&self, accept_encoding: Option<&str>) -> Result<CompressionDecision> {
        let prefs = self.parse(accept_encoding);
        self.select(&prefs)
    }

    /// Choose a coding from already-parsed preferences.
    pub fn select(&self, prefs: &EncodingPreferences) -> Result<CompressionDecision> {
        let accepted: Vec<(Coding, f64)> = prefs
            .iter()
            .filter(|(coding, weight)| coding.is_acceptable() && *weight > 0.0)
            .collect();

        let mut weights: Vec<f64> = accepted.iter().map(|(_, w)| *w).collect();
        weights.sort_by(|a, b| b.total_cmp(a));
        weights.dedup();

        for weight in weights {
            for algorithm in &self.preferred {
                let coding = Coding::from(*algorithm);
                if accepted.iter().any(|(c, w)| *c == coding && *w == weight) {
                    return Ok(CompressionDecision::Encode(*algorithm));
                }
            }
        }

        if prefs.weight(Coding::Identity) == Some(0.0) {
            return Err(CompressionError::NotAcceptable(format!(
                "Please accept {}, or identity",
                self.preferred
                    .iter()
                    .map(|a| a.encoding_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(CompressionDecision::Identity)
    }
}

/// Missing or unparseable weights count as 1; the result is clamped to [0, 1].
fn parse_weight(raw: Option<&str>) -> f64 {
    let weight = match raw.map(str::parse::<f64>) {
        Some(Ok(w)) if !w.is_nan() => w,
        _ => 1.0,
    };
    weight.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiate(header: Option<&str>) -> Result<CompressionDecision> {
        EncodingNegotiator::default().negotiate(header)
    }

    #[test]
    fn test_absent_header_prefers_brotli() {
        assert_eq!(
            negotiate(None).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Brotli)
        );
        assert_eq!(
            negotiate(Some("*")).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Brotli)
        );
    }

    #[test]
    fn test_wildcard_follows_custom_preference_order() {
        let negotiator = EncodingNegotiator::new(vec![
            CompressionAlgorithm::Gzip,
            CompressionAlgorithm::Deflate,
        ]);
        assert_eq!(
            negotiator.negotiate(Some("*")).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Gzip)
        );
    }

    #[test]
    fn test_wildcard_set_is_configurable() {
        let header = Some("gzip;q=0.5, *");
        assert_eq!(
            negotiate(header).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Brotli)
        );

        let narrowed = EncodingNegotiator::default().with_wildcard(vec![Coding::Gzip, Coding::Deflate]);
        assert_eq!(
            narrowed.negotiate(header).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Deflate)
        );
    }

    #[test]
    fn test_equal_weights_use_server_order() {
        assert_eq!(
            negotiate(Some("gzip;q=0.5, br;q=0.5")).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Brotli)
        );
        assert_eq!(
            negotiate(Some("deflate, gzip")).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Gzip)
        );
    }

    #[test]
    fn test_higher_weight_wins_over_preference() {
        assert_eq!(
            negotiate(Some("br;q=0.2, deflate;q=0.9")).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Deflate)
        );
    }

    #[test]
    fn test_weights_are_clamped() {
        let negotiator = EncodingNegotiator::default();
        let prefs = negotiator.parse(Some("gzip;q=1.5, br;q=-1"));
        assert_eq!(prefs.weight(Coding::Gzip), Some(1.0));
        assert_eq!(prefs.weight(Coding::Br), Some(0.0));
        assert_eq!(
            negotiator.select(&prefs).unwrap(),
            CompressionDecision::Encode(CompressionAlgorithm::Gzip)
        );
    }

    #[test]
    fn test_unparseable_weight_defaults_to_one() {
        let prefs = EncodingNegotiator::default().parse(Some("deflate;q=high, gzip;q=NaN"));
        assert_eq!(prefs.weight(Coding::Deflate), Some(1.0));
        assert_eq!(prefs.weight(Coding::Gzip), Some(1.0));
    }

    #[test]
    fn test_malformed_directives_are_skipped() {
        let prefs = EncodingNegotiator::default().parse(Some("zstd, GZIP, br;;q=1, deflate;q=0.3"));
        assert_eq!(prefs.iter().collect::<Vec<_>>(), vec![(Coding::Deflate, 0.3)]);
    }

    #[test]
    fn test_wildcard_never_overrides_explicit_weight() {
        let prefs = EncodingNegotiator::default().parse(Some("*;q=0.8, br;q=0.1"));
        assert_eq!(prefs.weight(Coding::Br), Some(0.1));
        assert_eq!(prefs.weight(Coding::Gzip), Some(0.8));
        assert_eq!(prefs.weight(Coding::Deflate), Some(0.8));
        assert_eq!(prefs.weight(Coding::Identity), None);
    }

    #[test]
    fn test_identity_excluded_with_nothing_usable_is_not_acceptable() {
        for header in ["identity;q=0", "compress, identity;q=0", "zstd, identity;q=0, compress;q=0.5"] {
            let err = negotiate(Some(header)).unwrap_err();
            assert!(matches!(err, CompressionError::NotAcceptable(_)), "{}", header);
        }
    }

    #[test]
    fn test_zero_weight_codings_are_never_chosen() {
        assert_eq!(negotiate(Some("gzip;q=0")).unwrap(), CompressionDecision::Identity);
        assert!(negotiate(Some("gzip;q=0, identity;q=0")).is_err());
    }

    #[test]
    fn test_unsupported_only_falls_back_to_identity() {
        assert_eq!(negotiate(Some("compress")).unwrap(), CompressionDecision::Identity);
        assert_eq!(negotiate(Some("")).unwrap(), CompressionDecision::Identity);
        assert_eq!(negotiate(Some("identity")).unwrap(), CompressionDecision::Identity);
    }

    #[test]
    fn test_disabled_algorithm_is_never_selected() {
        let negotiator = EncodingNegotiator::new(vec![CompressionAlgorithm::Gzip]);
        assert_eq!(
            negotiator.negotiate(Some("br")).unwrap(),
            CompressionDecision::Identity
        );
        assert!(negotiator.negotiate(Some("br, identity;q=0")).is_err());
    }
}
