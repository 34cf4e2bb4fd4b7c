//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::slugify;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory { pub name: String, pub slug: String }

impl Category {
    pub fn create(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::now_v7(), slug: slugify(&name), name, description: description.into(),
            image: None, subcategories: vec![], created_at: Utc::now(),
        }
    }

    /// Replaces the subcategory list, deriving slugs and dropping blank or
    /// repeated names.
    pub fn set_subcategories<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subcategories.clear();
        for name in names {
            let name = name.as_ref().trim();
            let slug = slugify(name);
            if slug.is_empty() || self.subcategories.iter().any(|s| s.slug == slug) { continue; }
            self.subcategories.push(Subcategory { name: name.to_string(), slug });
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.slug = slugify(&self.name);
    }

    /// Products refer to a category by slug or by display name.
    pub fn matches(&self, reference: &str) -> bool {
        self.slug == reference || self.name.eq_ignore_ascii_case(reference) || self.slug == slugify(reference)
    }

    pub fn has_subcategory(&self, reference: &str) -> bool {
        let wanted = slugify(reference);
        self.subcategories.iter().any(|s| s.slug == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcategories_are_slugged_and_deduplicated() {
        let mut c = Category::create("Home & Garden", "");
        assert_eq!(c.slug, "home-garden");
        c.set_subcategories(["Outdoor Lighting", "outdoor lighting", " ", "Rugs"]);
        assert_eq!(c.subcategories.len(), 2);
        assert_eq!(c.subcategories[0].slug, "outdoor-lighting");
        assert!(c.has_subcategory("Outdoor Lighting"));
    }

    #[test]
    fn matches_name_or_slug() {
        let c = Category::create("Men's Shoes", "");
        assert!(c.matches("men-s-shoes"));
        assert!(c.matches("MEN'S SHOES"));
        assert!(!c.matches("shoes"));
    }
}
