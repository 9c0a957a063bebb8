//! Game glyph normalization.
//!
//! The game client renders selected ASCII glyphs through a private-use-area
//! font: code points in [0xE020, 0xE0FF] are the ASCII range shifted up by
//! 0xE000. Discord cannot render those, so they are mapped back before
//! dispatch. Mapped glyphs come out upper-cased, matching how the custom
//! font displays them.

const GLYPH_LOW: u32 = 0xE020;
const GLYPH_HIGH: u32 = 0xE0FF;
const GLYPH_OFFSET: u32 = 0xE000;

/// Map private-use glyphs back to plain text. Pure and total; idempotent on
/// already-normalized input.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if (GLYPH_LOW..=GLYPH_HIGH).contains(&cp) {
                char::from_u32(cp - GLYPH_OFFSET)
                    .map(|mapped| mapped.to_ascii_uppercase())
                    .unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(sanitize("hello world"), "hello world");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   "), "   ");
    }

    #[test]
    fn test_glyphs_map_back_to_ascii() {
        // 0xE041 is the boxed 'A' glyph, 0xE031 the boxed '1'.
        let input = "\u{E041}\u{E031} ok";
        assert_eq!(sanitize(input), "A1 ok");
    }

    #[test]
    fn test_mapped_letters_are_uppercased() {
        // 0xE061 maps to 'a', rendered upper-case by the game font.
        assert_eq!(sanitize("\u{E061}\u{E062}"), "AB");
    }

    #[test]
    fn test_code_points_outside_range_unchanged() {
        // Just below and above the glyph range.
        let input = "\u{E01F}\u{E100}";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn test_idempotent() {
        let input = "Party up! \u{E049}\u{E04C}\u{E056} ★";
        let once = sanitize(input);
        assert_eq!(sanitize(&once), once);
    }
}
