/// Race classifier output index -> label. Order matches the training labels.
pub const RACE_LABELS: [&str; 3] = ["Asian", "Black", "White"];

/// Gender classifier threshold outcome -> label. The model scores "Male".
pub const GENDER_LABELS: [&str; 2] = ["Female", "Male"];

pub const GENDER_THRESHOLD: f32 = 0.5;

pub fn gender_label(is_male: bool) -> &'static str {
    GENDER_LABELS[usize::from(is_male)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_indices_follow_training_order() {
        assert_eq!(RACE_LABELS, ["Asian", "Black", "White"]);
    }

    #[test]
    fn gender_positive_class_is_male() {
        assert_eq!(gender_label(true), "Male");
        assert_eq!(gender_label(false), "Female");
    }
}
