//! 7-bit SMS alphabet used to carry bits as text.
//!
//! Septets map onto the GSM 03.38 basic character set. Position 0x1B is the
//! escape into the extension table there, so we map it onto the euro sign
//! instead, which phones send as an escape pair and which therefore costs
//! two units of message capacity.

const EURO_SEPTET: u8 = 0x1B;

#[rustfmt::skip]
const SYMBOLS: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '€', 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

/// Bits carried per character.
pub(super) const SYMBOL_BITS: u32 = 7;

/// Character for a septet; values above 127 have none.
pub(super) fn symbol(septet: u8) -> Option<char> {
    SYMBOLS.get(usize::from(septet)).copied()
}

pub(super) fn septet(c: char) -> Option<u8> {
    SYMBOLS.iter().position(|&s| s == c).map(|p| p as u8)
}

/// Message capacity units taken by the character for `septet`.
pub(super) const fn units(septet: u8) -> usize {
    if septet == EURO_SEPTET { 2 } else { 1 }
}

/// Capacity units taken by `text`, or the first character outside the alphabet.
pub(super) fn text_units(text: &str) -> Result<usize, char> {
    text.chars()
        .try_fold(0, |total, c| septet(c).map(|s| total + units(s)).ok_or(c))
}

///
/// TESTS
///
