use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 120, g: 200, b: 255 };
pub const ACCENT: Color = Color::TrueColor { r: 255, g: 165, b: 0 };
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const MAC_ADDR: Color = Color::TrueColor { r: 255, g: 120, b: 200 };
pub const ESSID: Color = Color::BrightWhite;
pub const VENDOR: Color = Color::TrueColor { r: 180, g: 160, b: 255 };
pub const CHANNEL: Color = Color::Cyan;

pub const WPS_UNLOCKED: Color = Color::BrightGreen;
pub const WPS_LOCKED: Color = Color::Red;
pub const WPS_OTHER: Color = Color::BrightBlack;

pub const HEX: Color = Color::Yellow;
