use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Tags a single publisher may carry, as enforced by the publisher form.
pub const MAX_TAGS: usize = 3;

/// Category and tag vocabulary. Tags use the label verbatim; categories use its slug.
const LABELS: &[&str] = &[
    "Free", "Art", "Music", "Outdoor", "Gardening", "Giving back", "Sleep", "Nutrition",
    "Diabetes", "Skincare", "Meditation", "Wellness", "Mindfulness", "Spirituality",
    "Losing weight", "Support group", "Smoking cessation", "Substance moderation", "Dance",
    "Pilates", "Boxing", "Walking club", "Running", "Zumba", "Training", "Bridge", "Mah jong",
    "Bingo", "Drop in class", "Date night", "New moms", "Playdates", "New friends", "Learning",
    "Books", "Lectures", "Conference", "Stand up", "Relaxing", "Beach", "Lifestyle", "Hobbies",
    "Pets", "Community", "Family", "Seniors", "Adults", "Teens", "Kids", "Toddlers", "Everyone",
];

/// CategoryOption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryOption {
    pub value: String,
    pub label: String,
}

/// Taxonomy
///
/// Read-only vocabulary served at GET /api/taxonomy for the publisher form and list filters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Taxonomy {
    pub categories: Vec<CategoryOption>,
    pub tags: Vec<String>,
    pub max_tags: usize,
}

/// "Giving back" -> "giving-back".
pub fn slugify(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub fn taxonomy() -> Taxonomy {
    Taxonomy {
        categories: LABELS
            .iter()
            .map(|label| CategoryOption {
                value: slugify(label),
                label: label.to_string(),
            })
            .collect(),
        tags: LABELS.iter().map(|label| label.to_string()).collect(),
        max_tags: MAX_TAGS,
    }
}

/// Human label for a stored category slug, if it is part of the vocabulary.
pub fn category_label(slug: &str) -> Option<&'static str> {
    LABELS.iter().copied().find(|label| slugify(label) == slug)
}
