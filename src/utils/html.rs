use std::collections::HashSet;

use ammonia::Builder;

/// Reduce free text (review notes, cancellation reasons) to plain text.
///
/// Every tag is stripped and the text is entity-escaped, so notes rendered in
/// a teacher or admin panel cannot carry markup.
pub fn clean_text(input: &str) -> String {
    let mut builder = Builder::default();
    builder.tags(HashSet::new());
    builder.clean(input.trim()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_markup() {
        assert_eq!(clean_text("<script>alert(1)</script>copied"), "copied");
        assert_eq!(clean_text("  <b>tab</b> change "), "tab change");
    }
}
