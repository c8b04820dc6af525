use owo_colors::OwoColorize;

/// RGB color representation
struct RgbColor {
    r: u8,
    g: u8,
    b: u8,
}

// Title color - #3ECF8E (green)
const TITLE_COLOR: RgbColor = RgbColor {
    r: 0x3E,
    g: 0xCF,
    b: 0x8E,
};

/// Lines of the start-up banner: a blank line, the title, the version and
/// another blank line.
pub fn banner_lines(version: &str, colored: bool) -> Vec<String> {
    let title = "Supabase Lab";
    let version = format!("v{version}");
    let (title, version) = if colored {
        (
            title
                .truecolor(TITLE_COLOR.r, TITLE_COLOR.g, TITLE_COLOR.b)
                .bold()
                .to_string(),
            version.dimmed().to_string(),
        )
    } else {
        (title.to_string(), version)
    };
    vec![String::new(), title, version, String::new()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_banner() {
        assert_eq!(
            banner_lines("0.1.0", false),
            vec!["", "Supabase Lab", "v0.1.0", ""]
        );
    }

    #[test]
    fn test_colored_banner_keeps_text() {
        let lines = banner_lines("0.1.0", true);
        assert!(lines[1].contains("Supabase Lab"));
        assert!(lines[2].contains("v0.1.0"));
    }
}
