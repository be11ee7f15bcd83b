/// Replace everything outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Make a client-supplied file name safe for a `Content-Disposition` header.
///
/// Dots are kept so extensions survive; a name made only of dots or that
/// ends up empty falls back to `fallback`.
pub fn sanitize_download_name(name: &str, fallback: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("Asha_Rao-2"), "Asha_Rao-2");
        assert_eq!(sanitize_path_component("Asha Rao"), "Asha_Rao");
        assert_eq!(sanitize_path_component("../etc"), "___etc");
        assert_eq!(sanitize_path_component("Rāo"), "R_o");
    }

    #[test]
    fn test_sanitize_download_name() {
        assert_eq!(sanitize_download_name("memo 12th.pdf", "file"), "memo_12th.pdf");
        assert_eq!(sanitize_download_name("a\"b;c.png", "file"), "a_b_c.png");
        assert_eq!(sanitize_download_name("..", "file"), "file");
        assert_eq!(sanitize_download_name("", "file"), "file");
    }
}
