/// Escapes a literal for use inside a single-quoted Drive search term.
pub fn escape_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Search expression for the non-trashed children of `parent_id`, optionally
/// restricted to an exact name.
pub fn children_query(parent_id: &str, name: Option<&str>) -> String {
    let mut query = format!(
        "'{}' in parents and trashed=false",
        escape_query_value(parent_id)
    );
    if let Some(name) = name {
        query.push_str(&format!(" and name='{}'", escape_query_value(name)));
    }
    query
}
