//! Extraction of the fenced `=== TSIM_SECTION_START:... ===` sections from a raw facts file.

/// Returns the trimmed body of `section_name`, or `None` if the section is absent.
///
/// The body starts after the `---` line that follows the start marker and ends at either
/// the `EXIT_CODE:` sentinel or the end marker, whichever comes first. An absent section is
/// not an error; a present-but-empty section yields `Some("")`.
pub fn extract_section<'a>(content: &'a str, section_name: &str) -> Option<&'a str> {
    let start_marker = format!("=== TSIM_SECTION_START:{section_name} ===");
    let end_marker = format!("=== TSIM_SECTION_END:{section_name} ===");

    let start_idx = content.find(&start_marker)?;
    let after_marker = &content[start_idx + start_marker.len()..];

    // Skip the `---` separator line, if present.
    let body_start = after_marker
        .find("---")
        .map(|i| i + 3)
        .unwrap_or(0);
    let rest = &after_marker[body_start..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);

    let end_idx = rest.find(&end_marker).unwrap_or(rest.len());
    let exit_code_idx = rest.find("\nEXIT_CODE:").unwrap_or(rest.len());

    let body_end = end_idx.min(exit_code_idx);
    Some(rest[..body_end].trim_end())
}

/// Names of every `routing_table` / `routing_table_<name>` section present, in the order
/// they first appear, paired with the table name (`None` for the unnamed default table).
pub fn routing_table_sections(content: &str) -> Vec<Option<String>> {
    let mut tables = Vec::new();

    if extract_section(content, "routing_table").is_some() {
        tables.push(None);
    }

    let search = "=== TSIM_SECTION_START:routing_table_";
    let mut offset = 0;
    while let Some(rel) = content[offset..].find(search) {
        let start = offset + rel + search.len();
        let name_end = content[start..]
            .find(" ===")
            .map(|i| start + i)
            .unwrap_or(content.len());
        tables.push(Some(content[start..name_end].to_string()));
        offset = name_end;
    }

    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_section() {
        let content = "\
=== TSIM_SECTION_START:interfaces ===
---
2: eth0: <UP> mtu 1500
EXIT_CODE:0
=== TSIM_SECTION_END:interfaces ===
";
        let body = extract_section(content, "interfaces").unwrap();
        assert_eq!(body, "2: eth0: <UP> mtu 1500");
    }

    #[test]
    fn missing_section_is_none() {
        let content = "=== TSIM_SECTION_START:interfaces ===\n---\nfoo\n=== TSIM_SECTION_END:interfaces ===\n";
        assert!(extract_section(content, "policy_rules").is_none());
    }

    #[test]
    fn empty_section_is_empty_string() {
        let content = "=== TSIM_SECTION_START:policy_rules ===\n---\nEXIT_CODE:0\n=== TSIM_SECTION_END:policy_rules ===\n";
        assert_eq!(extract_section(content, "policy_rules"), Some(""));
    }

    #[test]
    fn ends_at_exit_code_even_without_end_marker() {
        let content = "=== TSIM_SECTION_START:interfaces ===\n---\nline one\nEXIT_CODE:0\ntrailing garbage";
        assert_eq!(extract_section(content, "interfaces"), Some("line one"));
    }

    #[test]
    fn finds_named_routing_tables() {
        let content = "\
=== TSIM_SECTION_START:routing_table ===
---
default via 10.0.0.1 dev eth0
=== TSIM_SECTION_END:routing_table ===
=== TSIM_SECTION_START:routing_table_200 ===
---
10.9.0.0/16 via 10.1.1.1 dev eth0
=== TSIM_SECTION_END:routing_table_200 ===
";
        let tables = routing_table_sections(content);
        assert_eq!(tables, vec![None, Some("200".to_string())]);
    }
}
