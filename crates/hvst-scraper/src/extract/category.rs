use hvst_core::CategoryRecord;
use url::Url;

use super::text;
use super::RawElement;

/// A category link: name from its text, slug from its URL.
///
/// Skipped when the name is a navigation label, shorter than 2 characters,
/// or when the card has no usable link.
#[must_use]
pub fn parse_category(raw: &RawElement, base_url: &Url, city: &str) -> Option<CategoryRecord> {
    let name = text::lines(&raw.text).into_iter().next()?.to_string();
    if name.chars().count() < 2 || text::is_non_record_label(&name) {
        return None;
    }

    let url = text::absolute_url(base_url, raw.href.as_deref()?)?;
    let slug = text::slug_from_url(&url)?;
    let icon_url = raw
        .image
        .as_deref()
        .and_then(|src| text::absolute_url(base_url, src));

    Some(CategoryRecord {
        name,
        slug,
        url,
        icon_url,
        city: city.to_string(),
    })
}
