//! YAML catalog seed: category tree, vendors, and their products.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::category::CategoryRank;
use crate::pricing::validate_pricing;
use crate::slug::slugify;
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub slug: Option<String>,
    pub image_ref: Option<String>,
    #[serde(default)]
    pub children: Vec<CategorySeed>,
}

impl CategorySeed {
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSeed {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Category slugs root-first, e.g. `[electronics, phones]`.
    #[serde(default)]
    pub category_path: Vec<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub rating_average: i16,
    #[serde(default)]
    pub rating_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSeed {
    pub display_name: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub vendors: Vec<VendorSeed>,
}

fn default_true() -> bool {
    true
}

impl CatalogSeed {
    /// Flattens the category tree into `(rank, seed, parent_slug)` rows,
    /// parents before children.
    #[must_use]
    pub fn flatten_categories(&self) -> Vec<(CategoryRank, &CategorySeed, Option<String>)> {
        fn walk<'a>(
            nodes: &'a [CategorySeed],
            rank: CategoryRank,
            parent: Option<String>,
            out: &mut Vec<(CategoryRank, &'a CategorySeed, Option<String>)>,
        ) {
            for node in nodes {
                out.push((rank, node, parent.clone()));
                if let Some(child_rank) = rank.child() {
                    walk(&node.children, child_rank, Some(node.slug()), out);
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.categories, CategoryRank::Super, None, &mut out);
        out
    }
}

/// Load and validate a catalog seed from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_seed(path: &Path) -> Result<CatalogSeed, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SeedFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let seed: CatalogSeed = serde_yaml::from_str(&content)?;
    validate_seed(&seed)?;
    Ok(seed)
}

fn validate_seed(seed: &CatalogSeed) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();
    // slug -> parent slug, used to check product paths walk the tree
    let mut parents: HashMap<String, Option<String>> = HashMap::new();

    for node in &seed.categories {
        check_depth(node, 1)?;
    }

    for (_, node, parent) in seed.flatten_categories() {
        if node.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category name must be non-empty".to_string(),
            ));
        }
        let slug = node.slug();
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category slug: '{slug}'"
            )));
        }
        parents.insert(slug, parent);
    }

    let mut vendor_slugs = HashSet::new();
    for vendor in &seed.vendors {
        let slug = slugify(&vendor.display_name);
        if slug.is_empty() || !vendor_slugs.insert(slug) {
            return Err(ConfigError::Validation(format!(
                "vendor '{}' has an empty or duplicate slug",
                vendor.display_name
            )));
        }

        for product in &vendor.products {
            validate_pricing(product.price, product.discount_price).map_err(|e| {
                ConfigError::Validation(format!("product '{}': {e}", product.name))
            })?;

            if !(0..=100).contains(&product.rating_average) {
                return Err(ConfigError::Validation(format!(
                    "product '{}' rating_average must be 0-100",
                    product.name
                )));
            }

            let mut expected_parent: Option<String> = None;
            for slug in &product.category_path {
                match parents.get(slug) {
                    Some(parent) if *parent == expected_parent => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "product '{}' has an invalid category path at '{slug}'",
                            product.name
                        )));
                    }
                }
                expected_parent = Some(slug.clone());
            }
        }
    }

    Ok(())
}

fn check_depth(node: &CategorySeed, depth: usize) -> Result<(), ConfigError> {
    if depth > CategoryRank::ALL.len() {
        return Err(ConfigError::Validation(format!(
            "category '{}' is nested deeper than mini",
            node.name
        )));
    }
    node.children
        .iter()
        .try_for_each(|child| check_depth(child, depth + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
categories:
  - name: Electronics
    children:
      - name: Phones
        children:
          - name: Smart Phones
            children:
              - name: Android
vendors:
  - display_name: Acme Supply
    email: acme@example.com
    products:
      - name: Pixel
        price: "499.00"
        discount_price: "449.00"
        category_path: [electronics, phones, smart-phones, android]
"#;

    #[test]
    fn parses_and_validates_seed() {
        let seed: CatalogSeed = serde_yaml::from_str(SEED).expect("parse");
        validate_seed(&seed).expect("valid seed");

        let flat = seed.flatten_categories();
        assert_eq!(flat.len(), 4);
        assert_eq!(flat[0].0, CategoryRank::Super);
        assert_eq!(flat[3].0, CategoryRank::Mini);
        assert_eq!(flat[3].2.as_deref(), Some("smart-phones"));
        assert!(seed.vendors[0].products[0].in_stock);
    }

    #[test]
    fn rejects_category_path_that_skips_a_rank() {
        let mut seed: CatalogSeed = serde_yaml::from_str(SEED).expect("parse");
        seed.vendors[0].products[0].category_path = vec!["electronics".into(), "android".into()];
        let err = validate_seed(&seed).unwrap_err();
        assert!(err.to_string().contains("invalid category path at 'android'"));
    }

    #[test]
    fn rejects_discount_not_below_price() {
        let mut seed: CatalogSeed = serde_yaml::from_str(SEED).expect("parse");
        seed.vendors[0].products[0].discount_price = Some(Decimal::new(49_900, 2));
        assert!(validate_seed(&seed).is_err());
    }

    #[test]
    fn rejects_five_level_tree() {
        let mut seed: CatalogSeed = serde_yaml::from_str(SEED).expect("parse");
        seed.categories[0].children[0].children[0].children[0]
            .children
            .push(CategorySeed {
                name: "Too Deep".into(),
                slug: None,
                image_ref: None,
                children: vec![],
            });
        let err = validate_seed(&seed).unwrap_err();
        assert!(err.to_string().contains("deeper than mini"));
    }

    #[test]
    fn rejects_duplicate_category_slugs() {
        let mut seed: CatalogSeed = serde_yaml::from_str(SEED).expect("parse");
        seed.categories.push(CategorySeed {
            name: "Electronics".into(),
            slug: None,
            image_ref: None,
            children: vec![],
        });
        assert!(validate_seed(&seed).is_err());
    }

    #[test]
    fn shipped_catalog_seed_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/catalog.yaml");
        let seed = load_seed(&path).expect("config/catalog.yaml should load");
        assert_eq!(seed.categories.len(), 3);
        assert_eq!(seed.vendors.len(), 3);
        assert!(seed
            .flatten_categories()
            .iter()
            .any(|(rank, node, _)| *rank == CategoryRank::Mini && node.slug() == "ios"));
    }
}
