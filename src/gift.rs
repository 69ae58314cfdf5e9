//! GIFT text primitives
//!
//! Pure text builders for the pieces of the GIFT (Moodle) interchange format:
//! question names, category headers, feedback lines, numerical answers, image
//! markup and formula escaping. Everything here is side-effect free; the
//! pipeline stages in [`crate::transform`] decide when each builder is used.

/// Preamble marking a question's text as HTML
pub const HTML: &str = "[html]";

/// GIFT text for a question name: `::name::`
pub fn from_question_name(name: &str) -> String {
    format!("::{}::", name)
}

/// GIFT text for a category header.
///
/// When `within_course` is set, the category is scoped to the course in which
/// the questions are imported (the `$course$/` prefix).
pub fn from_category(name: &str, within_course: bool) -> String {
    let prefix = if within_course { "$course$/" } else { "" };
    format!("$CATEGORY: {}{}\n\n", prefix, name)
}

/// Inverse of [`from_category`]: recovers the category name and the
/// course-scoping flag from an emitted header.
pub fn parse_category(header: &str) -> Option<(String, bool)> {
    let rest = header.strip_prefix("$CATEGORY: ")?.trim_end_matches('\n');
    match rest.strip_prefix("$course$/") {
        Some(name) => Some((name.to_string(), true)),
        None => Some((rest.to_string(), false)),
    }
}

/// GIFT text for a feedback line
pub fn from_feedback(text: &str) -> String {
    format!("####{}", text)
}

/// GIFT answer line for a numerical solution, e.g. `#\t=%100%10:0.5#`.
///
/// The tolerance, when present, has already been resolved to its final text
/// (see [`crate::question::Solution`]).
pub fn from_numerical_solution(value: f64, error: Option<&str>) -> String {
    let error = match error {
        Some(e) => format!(":{}", e),
        None => String::new(),
    };
    format!("#\t=%100%{}{}#", value, error)
}

/// GIFT-escaped `<img>` markup for an image URL.
///
/// Width and height come as a pair or not at all; the typed configuration
/// (`images_settings` requires both fields) enforces the pairing upstream.
pub fn from_image_url(url: &str, size: Option<(u32, u32)>) -> String {
    let width_height = match size {
        // notice the space at the beginning
        Some((width, height)) => format!(" width=\"{}\" height=\"{}\"", width, height),
        None => String::new(),
    };
    let res = format!(
        "<img src=\"{}\" alt=\"\" role=\"presentation\" class=\"atto_image_button_text-bottom\"{}>",
        url, width_height
    );
    escape_reserved(&res, &[':', '~', '='])
}

/// Adapts a naked (no `$`'s) LaTeX formula to GIFT.
///
/// `\`, `{`, `}` and `=` get a leading backslash, `&` becomes `&amp;`, and
/// the result is wrapped in the `\\(` … `\\)` math delimiters Moodle expects.
pub fn from_latex_formula(naked: &str) -> String {
    let escaped = escape_reserved(naked, &['\\', '{', '}', '=']).replace('&', "&amp;");
    format!("\\\\({}\\\\)", escaped)
}

/// Prefixes every occurrence of the reserved characters with a backslash.
///
/// The backslash itself, when present in `reserved`, must come first so the
/// escapes added for the other characters are not escaped again.
pub fn escape_reserved(text: &str, reserved: &[char]) -> String {
    let mut res = text.to_string();
    for &c in reserved {
        res = res.replace(c, &format!("\\{}", c));
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn question_name_is_wrapped_in_double_colons() {
        assert_eq!(from_question_name("Q1"), "::Q1::");
    }

    #[rstest]
    #[case("Algebra", true, "$CATEGORY: $course$/Algebra\n\n")]
    #[case("Algebra", false, "$CATEGORY: Algebra\n\n")]
    #[case("Calculus/Limits", true, "$CATEGORY: $course$/Calculus/Limits\n\n")]
    fn category_header_round_trips(
        #[case] name: &str,
        #[case] within_course: bool,
        #[case] expected: &str,
    ) {
        let header = from_category(name, within_course);
        assert_eq!(header, expected);
        assert_eq!(
            parse_category(&header),
            Some((name.to_string(), within_course))
        );
    }

    #[test]
    fn non_header_text_does_not_parse_as_category() {
        assert_eq!(parse_category("::Q1::[html]statement"), None);
    }

    #[test]
    fn numerical_solution_with_error() {
        assert_eq!(from_numerical_solution(10.0, Some("0.5")), "#\t=%100%10:0.5#");
    }

    #[test]
    fn numerical_solution_without_error() {
        assert_eq!(from_numerical_solution(2.5, None), "#\t=%100%2.5#");
    }

    #[test]
    fn image_url_escapes_gift_characters() {
        let res = from_image_url("http://example.com/a.svg", None);
        assert!(res.starts_with("<img src\\=\"http\\://example.com/a.svg\""));
        assert!(!res.contains(" width"));
    }

    #[test]
    fn image_url_with_size_carries_both_attributes() {
        let res = from_image_url("http://example.com/a.svg", Some((320, 200)));
        assert!(res.contains("width\\=\"320\""));
        assert!(res.contains("height\\=\"200\""));
    }

    #[test]
    fn latex_formula_escapes_reserved_set_and_ampersand() {
        let res = from_latex_formula(r"\frac{a}{b} = c & d");
        assert_eq!(res, r"\\(\\frac\{a\}\{b\} \= c &amp; d\\)");
    }

    #[test]
    fn formula_escaping_leaves_no_unescaped_reserved_characters() {
        let res = from_latex_formula(r"x = \{1, 2\} & y");
        let inner = &res[3..res.len() - 3];
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                // consume whatever was escaped
                chars.next();
                continue;
            }
            assert!(
                !['{', '}', '='].contains(&c),
                "unescaped reserved character {:?} in {:?}",
                c,
                inner
            );
        }
        assert!(inner.contains("&amp;"));
        assert!(!inner.replace("&amp;", "").contains('&'));
    }

    #[test]
    fn feedback_gets_the_four_hash_prefix() {
        assert_eq!(from_feedback("well done"), "####well done");
    }
}
