//! Insurer registry and the static product lookup table.

use serde::{Deserialize, Serialize};

use crate::error::{PolicyTagError, Result};

// ---------------------------------------------------------------------------
// Insurer
// ---------------------------------------------------------------------------

/// Known insurers. Unknown codes resolve to [`Insurer::Etc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Insurer {
    Samsung,
    Kb,
    Meritz,
    Etc,
}

impl Insurer {
    const ALL: [Insurer; 4] = [Self::Samsung, Self::Kb, Self::Meritz, Self::Etc];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Samsung => "samsung",
            Self::Kb => "kb",
            Self::Meritz => "meritz",
            Self::Etc => "etc",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Samsung => "삼성화재",
            Self::Kb => "KB손해보험",
            Self::Meritz => "메리츠화재",
            Self::Etc => "기타",
        }
    }

    pub fn from_code(code: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|i| i.code() == code)
            .unwrap_or(Self::Etc)
    }
}

// ---------------------------------------------------------------------------
// Product table
// ---------------------------------------------------------------------------

/// One `[[products]]` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub insurer_code: String,
    pub product_code: String,
    pub product_name: String,
}

/// (insurer_code, product_code) → product display name.
#[derive(Debug, Clone, Default)]
pub struct ProductTable {
    entries: Vec<ProductEntry>,
}

impl ProductTable {
    pub fn new(entries: Vec<ProductEntry>) -> Self {
        Self { entries }
    }

    /// Every pair must be pre-registered; a miss is fatal.
    pub fn product_name(&self, insurer_code: &str, product_code: &str) -> Result<&str> {
        self.entries
            .iter()
            .find(|e| e.insurer_code == insurer_code && e.product_code == product_code)
            .map(|e| e.product_name.as_str())
            .ok_or_else(|| PolicyTagError::UnknownProductMapping {
                insurer_code: insurer_code.to_string(),
                product_code: product_code.to_string(),
            })
    }
}

/// The products registered out of the box.
pub fn default_products() -> Vec<ProductEntry> {
    [
        ("meritz", "1", "메리츠 마음든든 반려동물보험"),
        ("meritz", "2", "무배당 펫퍼민트 Puppy&Family보험 다이렉트2601"),
        ("meritz", "3", "무배당 펫퍼민트 Cat&Family보험 다이렉트2601"),
    ]
    .into_iter()
    .map(|(insurer, product, name)| ProductEntry {
        insurer_code: insurer.into(),
        product_code: product.into(),
        product_name: name.into(),
    })
    .collect()
}

/// Split `<insurer>_<product>_...` into its first two segments.
pub fn parse_file_identifiers(file_name: &str) -> Result<(&str, &str)> {
    let mut parts = file_name.split('_');
    match (parts.next(), parts.next()) {
        (Some(insurer), Some(product)) if !insurer.is_empty() && !product.is_empty() => {
            Ok((insurer, product))
        }
        _ => Err(PolicyTagError::validation(format!(
            "file name '{file_name}' must start with <insurer>_<product>_"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insurer_lookup_falls_back_to_etc() {
        assert_eq!(Insurer::from_code("meritz"), Insurer::Meritz);
        assert_eq!(Insurer::from_code("hanwha"), Insurer::Etc);
        assert_eq!(Insurer::Kb.display_name(), "KB손해보험");
    }

    #[test]
    fn registered_product_resolves() {
        let table = ProductTable::new(default_products());
        assert_eq!(table.product_name("meritz", "1").unwrap(), "메리츠 마음든든 반려동물보험");
    }

    #[test]
    fn unregistered_product_is_fatal() {
        let table = ProductTable::new(default_products());
        let err = table.product_name("meritz", "9").unwrap_err();
        assert!(matches!(err, PolicyTagError::UnknownProductMapping { .. }));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn file_identifiers_come_from_first_two_segments() {
        assert_eq!(
            parse_file_identifiers("meritz_1_maum_pet_12_16.pdf").unwrap(),
            ("meritz", "1")
        );
        assert!(parse_file_identifiers("terms.pdf").is_err());
    }
}
