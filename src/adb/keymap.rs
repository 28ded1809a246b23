//! ADB scan code to USB HID usage translation.
//!
//! One static layer, laid out PC-style: Command sends Alt and Option
//! sends GUI so the modifier row reads Ctrl, Win, Alt like a PC board.
//! Codes with no key on any Apple keyboard map to [`NO`].
//!
//! ```text
//! ,---.   ,---------------. ,---------------. ,---------------. ,-----------.             ,---.
//! |Esc|   |F1 |F2 |F3 |F4 | |F5 |F6 |F7 |F8 | |F9 |F10|F11|F12| |PrS|ScL|Pau|             |Pwr|
//! `---'   `---------------' `---------------' `---------------' `-----------'             `---'
//! ,-----------------------------------------------------------. ,-----------. ,---------------.
//! |  `|  1|  2|  3|  4|  5|  6|  7|  8|  9|  0|  -|  =|Backspa| |Ins|Hom|PgU| |NmL|  =|  /|  *|
//! |-----------------------------------------------------------| |-----------| |---------------|
//! |Tab  |  Q|  W|  E|  R|  T|  Y|  U|  I|  O|  P|  [|  ]|    \| |Del|End|PgD| |  7|  8|  9|  -|
//! |-----------------------------------------------------------| `-----------' |---------------|
//! |CapsLo|  A|  S|  D|  F|  G|  H|  J|  K|  L|  ;|  '|Return  |               |  4|  5|  6|  +|
//! |-----------------------------------------------------------|     ,---.     |---------------|
//! |Shift   |  Z|  X|  C|  V|  B|  N|  M|  ,|  .|  /|Shift     |     |Up |     |  1|  2|  3|   |
//! |-----------------------------------------------------------| ,-----------. |-----------|Ent|
//! |Ctrl |Gui |Alt |         Space           |     |Gui |Ctrl | |Lef|Dow|Rig| |      0|  .|   |
//! `-----------------------------------------------------------' `-----------' `---------------'
//! ```

use crate::hid::usage::*;

/// Indexed by the 7-bit ADB key code.
static KEYMAP: [u8; 128] = [
    A, S, D, F, H, G, Z, X, // 0x00
    C, V, NO, B, Q, W, E, R, // 0x08
    Y, T, N1, N2, N3, N4, N6, N5, // 0x10
    EQUAL, N9, N7, MINUS, N8, N0, RIGHT_BRACKET, O, // 0x18
    U, LEFT_BRACKET, I, P, ENTER, L, J, QUOTE, // 0x20
    K, SEMICOLON, BACKSLASH, COMMA, SLASH, N, M, DOT, // 0x28
    TAB, SPACE, GRAVE, BACKSPACE, NO, ESCAPE, LEFT_CTRL, LEFT_ALT, // 0x30
    LEFT_SHIFT, CAPS_LOCK, LEFT_GUI, LEFT, RIGHT, DOWN, UP, NO, // 0x38
    NO, KP_DOT, NO, KP_ASTERISK, NO, KP_PLUS, NO, NUM_LOCK, // 0x40
    NO, NO, NO, KP_SLASH, KP_ENTER, NO, KP_MINUS, NO, // 0x48
    NO, KP_EQUAL, KP_0, KP_1, KP_2, KP_3, KP_4, KP_5, // 0x50
    KP_6, KP_7, NO, KP_8, KP_9, NO, NO, NO, // 0x58
    F5, F6, F7, F3, F8, F9, NO, F11, // 0x60
    NO, PRINT_SCREEN, NO, SCROLL_LOCK, NO, F10, NO, F12, // 0x68
    NO, PAUSE, INSERT, HOME, PAGE_UP, DELETE, F4, END, // 0x70
    F2, PAGE_DOWN, F1, RIGHT_SHIFT, RIGHT_GUI, RIGHT_CTRL, NO, NO, // 0x78
];

/// USB usage for an ADB key code. The release bit is ignored.
pub fn usb_code_for(adb_code: u8) -> u8 {
    KEYMAP[usize::from(adb_code & 0x7F)]
}
