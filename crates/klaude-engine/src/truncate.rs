/// Truncate tool output if it exceeds `max_bytes`.
/// Truncates at a char boundary and appends a marker showing original vs truncated size.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut boundary = max_bytes;
    while !output.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!(
        "{}\n\n[truncated: {} bytes -> {} bytes]",
        &output[..boundary],
        output.len(),
        boundary
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_within_limit() {
        assert_eq!(truncate_output("hello world", 1024), "hello world");
    }

    #[test]
    fn exact_boundary_no_truncation() {
        let input = "a".repeat(100);
        assert_eq!(truncate_output(&input, 100), input);
    }

    #[test]
    fn truncates_with_marker() {
        let input = "a".repeat(1000);
        let result = truncate_output(&input, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.ends_with("[truncated: 1000 bytes -> 100 bytes]"));
    }

    #[test]
    fn respects_char_boundaries() {
        let input = "é".repeat(10); // 2 bytes each
        let result = truncate_output(&input, 5);
        assert!(result.starts_with("éé\n"));
        assert!(result.contains("-> 4 bytes"));
    }
}
