use std::fmt;

/// A packed `0xRRGGBBAA` colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x0000_0000);
    pub const RED: Color = Color(0xFF00_00FF);
    pub const DARK_RED: Color = Color(0x5C05_05FF);
    pub const MAGENTA: Color = Color(0xFB08_F7FF);
    pub const LAVENDER: Color = Color(0xC325_FFFF);
    pub const GREEN: Color = Color(0x08FB_0CFF);
    pub const DARK_GREEN: Color = Color(0x1C42_1FFF);
    pub const YELLOW: Color = Color(0xF7FB_08FF);
    pub const GOLD: Color = Color(0xFFD1_00FF);
    pub const ORANGE: Color = Color(0xFF8B_00FF);
    pub const SAGE: Color = Color(0x6FB9_7FFF);
    pub const BLUE: Color = Color(0x087E_FBFF);
    pub const SKY_BLUE: Color = Color(0x28AE_FFFF);
    pub const DARK_BLUE: Color = Color(0x0C08_FBFF);
    pub const TURQUOISE: Color = Color(0x08F7_FBFF);
    pub const WHITE: Color = Color(0xFFFF_FFFF);

    /// The selectable palette, in the order of its 1-based indices.
    pub const PALETTE: [(&'static str, Color); 16] = [
        ("Black", Color::BLACK),
        ("Red", Color::RED),
        ("Dark Red", Color::DARK_RED),
        ("Magenta", Color::MAGENTA),
        ("Lavender", Color::LAVENDER),
        ("Green", Color::GREEN),
        ("Dark Green", Color::DARK_GREEN),
        ("Yellow", Color::YELLOW),
        ("Gold", Color::GOLD),
        ("Orange", Color::ORANGE),
        ("Sage", Color::SAGE),
        ("Blue", Color::BLUE),
        ("Sky Blue", Color::SKY_BLUE),
        ("Dark Blue", Color::DARK_BLUE),
        ("Turquoise", Color::TURQUOISE),
        ("White", Color::WHITE),
    ];

    /// Looks up a palette entry by its 1-based index (1 = Black ... 16 = White).
    pub fn from_palette_index(index: u8) -> Option<Color> {
        let slot = usize::from(index).checked_sub(1)?;
        Self::PALETTE.get(slot).map(|&(_, color)| color)
    }

    /// Bytes in `[r, g, b, a]` order, as expected by RGBA8 frame buffers.
    pub fn to_rgba(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}
