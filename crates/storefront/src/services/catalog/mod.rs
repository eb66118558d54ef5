//! Catalog services: categories and products.

mod categories;
mod products;

pub use categories::{CategoryInput, CategoryService, CategoryUpdate};
pub use products::{ProductInput, ProductQuery, ProductService, ProductUpdate};

use super::CommerceError;

/// Trim `value` and check its length in characters.
fn text(field: &str, value: &str, min: usize, max: usize) -> Result<String, CommerceError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min {
        return Err(CommerceError::Validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(CommerceError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_owned())
}

/// Optional free text: blank becomes `None`.
fn optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, CommerceError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => text(field, v, 0, max).map(Some),
        None => Ok(None),
    }
}

/// Image URLs must be absolute http(s) URLs.
fn image_url(value: Option<&str>) -> Result<Option<String>, CommerceError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let parsed = url::Url::parse(value)
        .map_err(|e| CommerceError::Validation(format!("imageUrl: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CommerceError::Validation(
            "imageUrl must be an http or https URL".to_owned(),
        ));
    }
    Ok(Some(parsed.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_text_trims_and_counts_characters() {
        assert_eq!(text("name", "  Hoops ", 2, 50).unwrap(), "Hoops");
        assert!(text("name", "H", 2, 50).is_err());
        assert!(text("name", &"é".repeat(51), 2, 50).is_err());
    }

    #[test]
    fn test_image_url_requires_http() {
        assert_eq!(image_url(Some("  ")).unwrap(), None);
        assert!(image_url(Some("https://cdn.example.com/a.png")).unwrap().is_some());
        assert!(image_url(Some("ftp://cdn.example.com/a.png")).is_err());
        assert!(image_url(Some("not a url")).is_err());
    }
}
