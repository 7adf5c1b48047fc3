//! Built-in 5x7 bitmap face for overlay labels.
//!
//! Covers exactly what the ratio label needs (digits, a few letters and
//! punctuation). Each glyph is seven rows, top to bottom; bit 4 of a row
//! is the leftmost column.

/// Glyph cell width in font units.
pub const GLYPH_WIDTH: u32 = 5;

/// Glyph cell height in font units.
pub const GLYPH_HEIGHT: u32 = 7;

/// Horizontal distance between glyph origins (one unit of spacing).
pub const ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Row bitmaps for `c`, or `None` if the face has no glyph for it.
///
/// Characters without a glyph still advance the pen.
#[must_use]
pub const fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'u' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

/// Lit `(column, row)` cells of `c` in font units.
pub fn lit_cells(c: char) -> impl Iterator<Item = (u32, u32)> {
    let rows = glyph(c).unwrap_or([0; 7]);
    (0..GLYPH_HEIGHT).flat_map(move |row| {
        let bits = rows[row as usize];
        (0..GLYPH_WIDTH).filter_map(move |col| {
            let lit = bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0;
            lit.then_some((col, row))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_characters_are_covered() {
        for c in "Rust: 0123456789.%-".chars() {
            assert!(glyph(c).is_some(), "missing glyph for {c:?}");
        }
    }

    #[test]
    fn unknown_character_has_no_glyph() {
        assert!(glyph('Z').is_none());
        assert_eq!(lit_cells('Z').count(), 0);
    }

    #[test]
    fn glyph_rows_fit_width() {
        for c in "Rust: 0123456789.%-".chars() {
            for row in glyph(c).unwrap_or_default() {
                assert!(row < 1 << GLYPH_WIDTH, "{c:?} row {row:#x} too wide");
            }
        }
    }

    #[test]
    fn lit_cells_of_one() {
        let cells: Vec<_> = lit_cells('1').collect();
        // Stem in column 2 on every row, flag at (1, 1), base on row 6.
        assert!(cells.contains(&(2, 0)));
        assert!(cells.contains(&(1, 1)));
        assert!(cells.contains(&(1, 6)) && cells.contains(&(3, 6)));
        assert_eq!(cells.len(), 1 + 2 + 1 + 1 + 1 + 1 + 3);
    }

    #[test]
    fn space_is_blank() {
        assert_eq!(lit_cells(' ').count(), 0);
    }
}
