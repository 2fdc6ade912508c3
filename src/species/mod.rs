//! Species enumerations. Each material defines a closed enum and implements
//! [`Species`] for it; the number of variants is the dimension of the
//! composition space.

use std::fmt::Debug;

pub trait Species: Copy + Eq + Debug + Send + Sync + 'static {
    /// Every variant, in axis order.
    const ALL: &'static [Self];

    /// Axis of this species in a composition.
    fn index(self) -> usize;

    /// Short label used in headers ("He", "V", ...).
    fn label(self) -> &'static str;

    /// Long name ("Helium", "Vacancy", ...).
    fn name(self) -> &'static str;

    fn is_vacancy(self) -> bool {
        false
    }

    fn is_interstitial(self) -> bool {
        false
    }

    /// Whether super-clusters may span more than one amount on this axis.
    fn groupable(self) -> bool {
        !self.is_interstitial()
    }
}

#[inline]
pub fn num_species<S: Species>() -> usize {
    S::ALL.len()
}

pub fn from_index<S: Species>(axis: usize) -> Option<S> {
    S::ALL.get(axis).copied()
}

/// Look up a species by label or long name, case-insensitively.
pub fn parse_species_id<S: Species>(text: &str) -> Option<S> {
    S::ALL.iter().copied().find(|s| {
        s.label().eq_ignore_ascii_case(text) || s.name().eq_ignore_ascii_case(text)
    })
}

/// Axis of the vacancy species, if the material has one.
pub fn vacancy_axis<S: Species>() -> Option<usize> {
    S::ALL.iter().find(|s| s.is_vacancy()).map(|s| s.index())
}

/// Axis of the interstitial species, if the material has one.
pub fn interstitial_axis<S: Species>() -> Option<usize> {
    S::ALL.iter().find(|s| s.is_interstitial()).map(|s| s.index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::psi::PsiSpecies;

    #[test]
    fn test_parse_species() {
        assert_eq!(parse_species_id::<PsiSpecies>("he"), Some(PsiSpecies::He));
        assert_eq!(parse_species_id::<PsiSpecies>("Vacancy"), Some(PsiSpecies::V));
        assert_eq!(parse_species_id::<PsiSpecies>("Xe"), None);
    }

    #[test]
    fn test_special_axes() {
        assert_eq!(num_species::<PsiSpecies>(), 5);
        assert_eq!(vacancy_axis::<PsiSpecies>(), Some(3));
        assert_eq!(interstitial_axis::<PsiSpecies>(), Some(4));
        assert!(!PsiSpecies::I.groupable());
        assert_eq!(from_index::<PsiSpecies>(0), Some(PsiSpecies::He));
    }
}
