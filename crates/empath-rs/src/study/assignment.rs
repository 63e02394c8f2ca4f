//! Sequential style assignment and the watermark coin flip.
//!
//! New participants rotate through [`EmpathyStyle::ALL`] by enrollment
//! count: participant `i` receives `ALL[i mod 4]`. The count is read from
//! the persistence collaborator and then used without locking, so two
//! concurrent enrollments can land on the same slot; a deployment that
//! needs strict balance should move to an atomic increment-and-assign in
//! its repository implementation.

use crate::study::style::{EmpathyStyle, WatermarkCondition};
use rand::Rng;

/// Style for the next enrollment given how many participants exist already.
pub fn style_for_enrollment(enrolled_count: u64) -> EmpathyStyle {
    EmpathyStyle::ALL[(enrolled_count % EmpathyStyle::ALL.len() as u64) as usize]
}

/// Uniformly random style, used when the enrollment count is unavailable.
/// Availability over rotation balance.
pub fn random_style() -> EmpathyStyle {
    EmpathyStyle::ALL[rand::rng().random_range(0..EmpathyStyle::ALL.len())]
}

/// Fresh watermark coin flip, independent of style assignment.
pub fn random_watermark() -> WatermarkCondition {
    if rand::rng().random_bool(0.5) {
        WatermarkCondition::Visible
    } else {
        WatermarkCondition::Hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_cycles_all_four_styles() {
        let styles: Vec<EmpathyStyle> = (0..8).map(style_for_enrollment).collect();
        assert_eq!(&styles[..4], &EmpathyStyle::ALL);
        assert_eq!(&styles[4..], &EmpathyStyle::ALL);
    }

    #[test]
    fn rotation_is_index_mod_four() {
        assert_eq!(style_for_enrollment(0), EmpathyStyle::Cognitive);
        assert_eq!(style_for_enrollment(1), EmpathyStyle::Emotional);
        assert_eq!(style_for_enrollment(2), EmpathyStyle::Motivational);
        assert_eq!(style_for_enrollment(3), EmpathyStyle::Neutral);
        assert_eq!(style_for_enrollment(4), EmpathyStyle::Cognitive);
        assert_eq!(style_for_enrollment(102), EmpathyStyle::Motivational);
    }

    #[test]
    fn random_style_is_a_member() {
        for _ in 0..50 {
            assert!(EmpathyStyle::ALL.contains(&random_style()));
        }
    }

    #[test]
    fn watermark_flip_produces_both_conditions() {
        let mut seen_visible = false;
        let mut seen_hidden = false;
        for _ in 0..200 {
            match random_watermark() {
                WatermarkCondition::Visible => seen_visible = true,
                WatermarkCondition::Hidden => seen_hidden = true,
            }
        }
        assert!(seen_visible && seen_hidden);
    }
}
