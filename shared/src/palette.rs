//! Fixed display palette. Group position picks the entry, wrapping
//! after sixteen groups.

/// RGB triples in 16-bit channel units, matching the legacy table so
/// existing viewers keep their group colors.
pub const PALETTE: [[u16; 3]; 16] = [
    [180, 0, 0],     // red
    [0, 180, 0],     // green
    [0, 0, 180],     // blue
    [180, 0, 180],   // pink
    [0, 180, 180],   // cyan
    [180, 180, 0],   // dirty yellow
    [255, 127, 0],   // orange
    [0, 102, 0],     // dark green
    [77, 0, 153],    // dark violet
    [153, 153, 153], // gray
    [255, 153, 153], // pastel red
    [255, 255, 0],   // yellow
    [153, 153, 255], // pastel violet
    [102, 0, 0],     // dark red
    [0, 0, 102],     // dark blue
    [0, 64, 64],     // dark cyan
];

pub fn color_for_group(index: usize) -> [u16; 3] {
    PALETTE[index % PALETTE.len()]
}
