//! Closed set of attention strategy tags.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::AttentionError;

/// Identifies which attention strategy a layer dispatches to.
///
/// The serialised names are the tags used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttentionKind {
    /// Softmax over scaled dot products.
    #[serde(rename = "basic_attn")]
    ScaledDotProduct,
    /// Period-based dependencies via lag correlation (Autoformer).
    #[serde(rename = "autoformer")]
    AutoCorrelation,
    /// Query-sparse attention keeping the most informative queries (Informer).
    #[serde(rename = "informer")]
    ProbSparse,
    /// Keys restricted to exponentially spaced distances (LogTrans).
    #[serde(rename = "LogTrans")]
    LogSparse,
    /// Multi-width smoothed queries/keys with per-pair max scoring.
    #[serde(rename = "ACAT")]
    Acat,
    /// Single-width smoothed queries/keys.
    #[serde(rename = "KittyCat")]
    KittyCat,
}

impl AttentionKind {
    pub const ALL: [AttentionKind; 6] = [
        AttentionKind::ScaledDotProduct,
        AttentionKind::AutoCorrelation,
        AttentionKind::ProbSparse,
        AttentionKind::LogSparse,
        AttentionKind::Acat,
        AttentionKind::KittyCat,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            AttentionKind::ScaledDotProduct => "basic_attn",
            AttentionKind::AutoCorrelation => "autoformer",
            AttentionKind::ProbSparse => "informer",
            AttentionKind::LogSparse => "LogTrans",
            AttentionKind::Acat => "ACAT",
            AttentionKind::KittyCat => "KittyCat",
        }
    }

    /// Whether the strategy honours a caller supplied mask.
    pub fn uses_mask(&self) -> bool {
        !matches!(self, AttentionKind::AutoCorrelation)
    }
}

impl fmt::Display for AttentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AttentionKind {
    type Err = AttentionError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        AttentionKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| AttentionError::UnknownStrategy {
                tag: tag.to_string(),
                expected: AttentionKind::ALL
                    .iter()
                    .map(AttentionKind::tag)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_from_str() {
        for kind in AttentionKind::ALL {
            assert_eq!(kind.tag().parse::<AttentionKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.tag());
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let err = "flash".parse::<AttentionKind>().unwrap_err();
        assert!(matches!(err, AttentionError::UnknownStrategy { ref tag, .. } if tag == "flash"));
        assert!(err.to_string().contains("basic_attn"));
        assert!("kittycat".parse::<AttentionKind>().is_err());
    }
}
