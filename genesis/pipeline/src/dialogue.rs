use crate::directive::Directive;

/// Plain-language acknowledgement returned to the caller with every result.
#[must_use]
pub fn acknowledge(directive: &Directive) -> String {
    format!(
        "Considering your directive using {} characters. Working process follows.",
        directive.char_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_characters_not_bytes() {
        let directive = Directive::new("évacuer").unwrap();
        assert_eq!(
            acknowledge(&directive),
            "Considering your directive using 7 characters. Working process follows."
        );
    }
}
