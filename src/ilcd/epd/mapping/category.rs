//! Classification entries to openEPD categories.
//!
//! The table is keyed by (classification system, class id). An entry
//! without a category defers to its parent entry, so a sub class inherits
//! the category of the closest mapped ancestor.

use crate::ilcd::epd::dialect::rules::CategoryRule;
use crate::ilcd::epd::model::ProductClass;
use crate::ilcd::epd::model::openepd::UnknownClassification;

struct CategoryEntry {
    system: &'static str,
    code: &'static str,
    parent: Option<&'static str>,
    category: Option<&'static str>,
}

const fn entry(
    system: &'static str,
    code: &'static str,
    parent: Option<&'static str>,
    category: Option<&'static str>,
) -> CategoryEntry {
    CategoryEntry {
        system,
        code,
        parent,
        category,
    }
}

const CATEGORIES: &[CategoryEntry] = &[
    entry("OEKOBAU.DAT", "1", None, None),
    entry("OEKOBAU.DAT", "1.3", Some("1"), Some("Masonry")),
    entry("OEKOBAU.DAT", "1.3.01", Some("1.3"), Some("Brick")),
    entry("OEKOBAU.DAT", "1.4", Some("1"), Some("Concrete")),
    entry("OEKOBAU.DAT", "1.4.01", Some("1.4"), Some("ReadyMix")),
    entry("OEKOBAU.DAT", "1.4.02", Some("1.4"), None),
    entry("OEKOBAU.DAT", "1.4.03", Some("1.4"), Some("Precast")),
    entry("OEKOBAU.DAT", "2", None, Some("Insulation")),
    entry("OEKOBAU.DAT", "2.1", Some("2"), None),
    entry("OEKOBAU.DAT", "3", None, Some("Wood")),
    entry("OEKOBAU.DAT", "3.1", Some("3"), None),
    entry("OEKOBAU.DAT", "4", None, None),
    entry("OEKOBAU.DAT", "4.1", Some("4"), Some("Steel")),
    entry("OEKOBAU.DAT", "4.1.01", Some("4.1"), Some("RebarSteel")),
    entry("OEKOBAU.DAT", "4.2", Some("4"), Some("Aluminium")),
    entry("OEKOBAU.DAT", "5", None, Some("Coatings")),
    entry("OEKOBAU.DAT", "7", None, Some("Glass")),
    entry("OEKOBAU.DAT", "6.4", None, Some("Flooring")),
    entry("IBUCategories", "Mineral building products", None, None),
    entry("IBUCategories", "Concrete", Some("Mineral building products"), Some("Concrete")),
    entry("IBUCategories", "Insulating materials", None, Some("Insulation")),
    entry("IBUCategories", "Metals", None, None),
    entry("IBUCategories", "Steel and iron", Some("Metals"), Some("Steel")),
    entry("IBUCategories", "Aluminium", Some("Metals"), Some("Aluminium")),
    entry("IBUCategories", "Wood products", None, Some("Wood")),
    entry("epdnorge", "Betong", None, Some("Concrete")),
    entry("epdnorge", "Ferdigbetong", Some("Betong"), Some("ReadyMix")),
    entry("epdnorge", "Betongelementer", Some("Betong"), Some("Precast")),
    entry("epdnorge", "Tegl", None, Some("Brick")),
    entry("epdnorge", "Isolasjon", None, Some("Insulation")),
    entry("epdnorge", "Trevarer", None, Some("Wood")),
    entry("epdnorge", "Stål", None, Some("Steel")),
    entry("epdnorge", "Armering", Some("Stål"), Some("RebarSteel")),
    entry("epdnorge", "Aluminium", None, Some("Aluminium")),
    entry("epdnorge", "Glass", None, Some("Glass")),
    entry("epdnorge", "Maling", None, Some("Coatings")),
    entry("epdnorge", "Gulv", None, Some("Flooring")),
];

fn find(system: &str, code: &str) -> Option<&'static CategoryEntry> {
    CATEGORIES
        .iter()
        .find(|entry| entry.system.eq_ignore_ascii_case(system) && entry.code.eq_ignore_ascii_case(code))
}

/// Category of a code, following parents of unmapped entries.
fn category_of(system: &str, code: &str) -> Option<&'static str> {
    let mut current = find(system, code);
    // the table is shallow; the bound guards against accidental cycles
    for _ in 0..CATEGORIES.len() {
        let entry = current?;
        if let Some(category) = entry.category {
            return Some(category);
        }
        current = find(system, entry.parent?);
    }
    None
}

/// Code a class is looked up by: its id, else its name, reduced according
/// to the dialect rule.
pub fn class_code(system: &str, class: &ProductClass, rule: CategoryRule) -> Option<String> {
    let raw = class.id.as_deref().or(class.name.as_deref())?.trim();
    if raw.is_empty() {
        return None;
    }
    match rule {
        CategoryRule::LeadingToken(target) if target.eq_ignore_ascii_case(system) => {
            raw.split_whitespace().next().map(str::to_string)
        }
        _ => Some(raw.to_string()),
    }
}

/// Keys a class is looked up by. Under [`CategoryRule::LeadingToken`] the
/// leaf of the `<uuid> <path>` name follows the code, since the provider's
/// identifiers are not part of the table.
fn lookup_keys(system: &str, class: &ProductClass, rule: CategoryRule) -> Vec<String> {
    let mut keys: Vec<String> = class_code(system, class, rule).into_iter().collect();
    let CategoryRule::LeadingToken(target) = rule else {
        return keys;
    };
    if !target.eq_ignore_ascii_case(system) {
        return keys;
    }
    let Some(name) = class.name.as_deref().map(str::trim) else {
        return keys;
    };
    let path = match name.split_once(char::is_whitespace) {
        Some((head, rest)) if uuid::Uuid::parse_str(head).is_ok() => rest,
        _ => name,
    };
    if let Some(leaf) = path.rsplit('/').next().map(str::trim).filter(|leaf| !leaf.is_empty()) {
        if !keys.iter().any(|key| key == leaf) {
            keys.push(leaf.to_string());
        }
    }
    keys
}

/// Result of mapping all classifications of one dataset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CategoryMapping {
    pub categories: Vec<String>,
    pub unknown: Vec<UnknownClassification>,
}

/// Maps every classification system. The deepest class with a mapping
/// wins; a system without any mapping is kept verbatim as unknown.
pub fn map_categories(
    classifications: &[(String, Vec<ProductClass>)],
    rule: CategoryRule,
) -> CategoryMapping {
    let mut mapping = CategoryMapping::default();
    for (system, classes) in classifications {
        if classes.is_empty() {
            continue;
        }
        let found = classes.iter().rev().find_map(|class| {
            lookup_keys(system, class, rule)
                .iter()
                .find_map(|key| category_of(system, key))
        });
        match found {
            Some(category) => {
                if !mapping.categories.iter().any(|known| known == category) {
                    mapping.categories.push(category.to_string());
                }
            }
            None => {
                let path: Vec<&str> = classes
                    .iter()
                    .filter_map(|class| class.name.as_deref())
                    .collect();
                mapping.unknown.push(UnknownClassification {
                    system: system.clone(),
                    code: classes
                        .last()
                        .and_then(|class| class_code(system, class, rule)),
                    path: (!path.is_empty()).then(|| path.join(" / ")),
                });
            }
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: &str, name: &str) -> ProductClass {
        ProductClass {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn deepest_mapped_class_wins() {
        let classifications = vec![(
            "OEKOBAU.DAT".to_string(),
            vec![
                class("1", "Mineralische Baustoffe"),
                class("1.4", "Beton"),
                class("1.4.01", "Transportbeton"),
            ],
        )];
        let mapping = map_categories(&classifications, CategoryRule::Verbatim);
        assert_eq!(mapping.categories, vec!["ReadyMix"]);
        assert!(mapping.unknown.is_empty());
    }

    #[test]
    fn unmapped_entries_inherit_from_parents() {
        assert_eq!(category_of("oekobau.dat", "1.4.02"), Some("Concrete"));
        assert_eq!(category_of("oekobau.dat", "1"), None);
    }

    #[test]
    fn unknown_systems_are_kept_verbatim() {
        let classifications = vec![(
            "Custom".to_string(),
            vec![class("A", "Building"), class("A.7", "Roof tiles")],
        )];
        let mapping = map_categories(&classifications, CategoryRule::Verbatim);
        assert!(mapping.categories.is_empty());
        assert_eq!(
            mapping.unknown,
            vec![UnknownClassification {
                system: "Custom".into(),
                code: Some("A.7".into()),
                path: Some("Building / Roof tiles".into()),
            }]
        );
    }

    #[test]
    fn leading_token_applies_to_its_system_only() {
        let class = ProductClass {
            id: None,
            name: Some("071f9a38-08af-4ee5-909a-9884e93816c0 Bygg / Teknisk-kjemiske".into()),
        };
        let rule = CategoryRule::LeadingToken("epdnorge");
        assert_eq!(
            class_code("EPDNorge", &class, rule).as_deref(),
            Some("071f9a38-08af-4ee5-909a-9884e93816c0")
        );
        assert_eq!(
            class_code("other", &class, rule).as_deref(),
            Some("071f9a38-08af-4ee5-909a-9884e93816c0 Bygg / Teknisk-kjemiske")
        );
    }

    #[test]
    fn norwegian_classes_map_by_their_leaf_name() {
        let rule = CategoryRule::LeadingToken("epdnorge");
        let classifications = vec![(
            "EPDNorge".to_string(),
            vec![ProductClass {
                id: None,
                name: Some(
                    "6d1c4e0a-3b52-4f5e-9a7d-1c2b3a4d5e6f Bygg / Betong / Ferdigbetong".into(),
                ),
            }],
        )];
        let mapping = map_categories(&classifications, rule);
        assert_eq!(mapping.categories, vec!["ReadyMix"]);
        assert!(mapping.unknown.is_empty());

        let classifications = vec![(
            "EPDNorge".to_string(),
            vec![ProductClass {
                id: None,
                name: Some("071f9a38-08af-4ee5-909a-9884e93816c0 Bygg / Teknisk-kjemiske".into()),
            }],
        )];
        let mapping = map_categories(&classifications, rule);
        assert!(mapping.categories.is_empty());
        assert_eq!(
            mapping.unknown[0].code.as_deref(),
            Some("071f9a38-08af-4ee5-909a-9884e93816c0")
        );

        // the leaf lookup is limited to the dialect's system
        let classifications = vec![("Custom".to_string(), vec![class("X", "Betong")])];
        assert!(map_categories(&classifications, rule).categories.is_empty());
    }
}
