//! Text helpers shared by record loading and query parsing.

use std::sync::LazyLock;

use regex::Regex;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]").expect("static pattern compiles"));

/// Lower-cases a column header and strips everything but `[a-z0-9]`.
///
/// `"Functional Area"` and `"functional_area"` both become `"functionalarea"`.
pub fn normalize_column_name(name: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

/// True when the string has at least one non-whitespace character.
pub fn is_well_formed(text: &str) -> bool {
    !text.trim().is_empty()
}
