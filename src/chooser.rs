//! Selection of one capability set out of the platform's candidates.
//!
//! After a backend enumerated the candidate formats and decoded each one
//! into [`Capabilities`], a [`CapabilitiesChooser`] picks the index that is
//! actually used. Backends pass along the platform's own recommendation
//! when it made one, and the chooser decides whether to honor it.

use crate::caps::Capabilities;
use crate::error::{ErrorKind, Result};

/// Strategy for picking one candidate capability set.
///
/// Implement this to override the stock selection policy, for example to
/// hard-require multisampling or to always take the deepest depth buffer.
pub trait CapabilitiesChooser {
    /// Pick the index of the candidate to use.
    ///
    /// Entries in `candidates` are `None` when the native format at that
    /// index could not be decoded; those indices must not be returned.
    /// `recommended` is the platform's own pick, already validated to be in
    /// bounds and decodable, or `None` when the platform made no
    /// recommendation.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::SelectionExhausted`] when no candidate is usable.
    fn choose(
        &self,
        desired: &Capabilities,
        candidates: &[Option<Capabilities>],
        recommended: Option<usize>,
    ) -> Result<usize>;
}

/// The stock chooser.
///
/// Honors the platform recommendation when present. Otherwise scores each
/// candidate by how far its total RGBA depth is from the desired one and
/// takes the closest, preferring a surplus of bits over a deficit on ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChooser;

/// Weight of one bit of RGBA color depth in the candidate score.
///
/// Kept large so that future secondary criteria can be folded into the
/// score without ever outweighing a whole bit of color.
const COLOR_BIT_WEIGHT: i32 = 36;

impl CapabilitiesChooser for DefaultChooser {
    fn choose(
        &self,
        desired: &Capabilities,
        candidates: &[Option<Capabilities>],
        recommended: Option<usize>,
    ) -> Result<usize> {
        if let Some(recommended) = recommended {
            return Ok(recommended);
        }

        let desired_sum = desired.rgba_sum();

        let mut best: Option<(usize, i32)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let candidate = match candidate {
                Some(candidate) => candidate,
                None => continue,
            };

            let score = COLOR_BIT_WEIGHT * (candidate.rgba_sum() - desired_sum);
            let better = match best {
                None => true,
                Some((_, best_score)) => match score.abs().cmp(&best_score.abs()) {
                    std::cmp::Ordering::Less => true,
                    // On an exact distance tie prefer the candidate with a
                    // surplus of bits over the one with a deficit.
                    std::cmp::Ordering::Equal => score >= 0 && best_score < 0,
                    std::cmp::Ordering::Greater => false,
                },
            };

            if better {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, _)) => Ok(index),
            None => Err(ErrorKind::SelectionExhausted.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapabilitiesBuilder;

    fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Capabilities {
        CapabilitiesBuilder::new()
            .with_color_sizes(red, green, blue)
            .with_alpha_size(alpha)
            .build()
    }

    #[test]
    fn recommendation_wins_over_scoring() {
        let desired = rgba(8, 8, 8, 8);
        // Index 0 is the exact match, but the platform recommended 1.
        let candidates = vec![Some(rgba(8, 8, 8, 8)), Some(rgba(5, 6, 5, 0))];
        let chosen = DefaultChooser.choose(&desired, &candidates, Some(1)).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn closest_rgba_sum_wins() {
        let desired = rgba(8, 8, 8, 8);
        let candidates = vec![
            Some(rgba(5, 6, 5, 0)),   // sum 16, distance 16
            Some(rgba(8, 8, 8, 0)),   // sum 24, distance 8
            Some(rgba(10, 10, 10, 2)), // sum 32, exact
        ];
        let chosen = DefaultChooser.choose(&desired, &candidates, None).unwrap();
        assert_eq!(chosen, 2);
    }

    #[test]
    fn tie_prefers_surplus_bits() {
        let desired = rgba(8, 8, 8, 0); // sum 24
        let candidates = vec![
            Some(rgba(5, 6, 5, 0)), // sum 16, score -288
            Some(rgba(8, 8, 8, 8)), // sum 32, score +288
        ];
        let chosen = DefaultChooser.choose(&desired, &candidates, None).unwrap();
        assert_eq!(chosen, 1);

        // Order independence: surplus still wins when scanned first.
        let candidates = vec![
            Some(rgba(8, 8, 8, 8)),
            Some(rgba(5, 6, 5, 0)),
        ];
        let chosen = DefaultChooser.choose(&desired, &candidates, None).unwrap();
        assert_eq!(chosen, 0);
    }

    #[test]
    fn undecodable_candidates_are_skipped() {
        let desired = rgba(8, 8, 8, 8);
        let candidates = vec![None, Some(rgba(5, 6, 5, 0)), None];
        let chosen = DefaultChooser.choose(&desired, &candidates, None).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn no_usable_candidate_is_an_error() {
        let desired = rgba(8, 8, 8, 8);
        let candidates: Vec<Option<Capabilities>> = vec![None, None];
        let err = DefaultChooser.choose(&desired, &candidates, None).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::SelectionExhausted);

        let err = DefaultChooser.choose(&desired, &[], None).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::SelectionExhausted);
    }
}
