use ratatui::style::Color;

/// A named color palette for the whole UI.
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub muted: Color,
  pub accent: Color,
  pub border: Color,
  pub error: Color,
  pub status: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub static THEMES: [Theme; 3] = [
  Theme {
    name: "dawn",
    bg: Color::Rgb(250, 244, 237),
    fg: Color::Rgb(87, 82, 121),
    muted: Color::Rgb(152, 147, 165),
    accent: Color::Rgb(180, 99, 122),
    border: Color::Rgb(223, 218, 217),
    error: Color::Rgb(180, 99, 122),
    status: Color::Rgb(40, 105, 131),
    highlight_fg: Color::Rgb(250, 244, 237),
    highlight_bg: Color::Rgb(180, 99, 122),
    stripe_bg: Color::Rgb(244, 237, 228),
    key_fg: Color::Rgb(250, 244, 237),
    key_bg: Color::Rgb(152, 147, 165),
  },
  Theme {
    name: "dusk",
    bg: Color::Rgb(25, 23, 36),
    fg: Color::Rgb(224, 222, 244),
    muted: Color::Rgb(110, 106, 134),
    accent: Color::Rgb(235, 188, 186),
    border: Color::Rgb(64, 61, 82),
    error: Color::Rgb(235, 111, 146),
    status: Color::Rgb(156, 207, 216),
    highlight_fg: Color::Rgb(25, 23, 36),
    highlight_bg: Color::Rgb(235, 188, 186),
    stripe_bg: Color::Rgb(31, 29, 46),
    key_fg: Color::Rgb(25, 23, 36),
    key_bg: Color::Rgb(110, 106, 134),
  },
  Theme {
    name: "mono",
    bg: Color::Reset,
    fg: Color::Gray,
    muted: Color::DarkGray,
    accent: Color::White,
    border: Color::DarkGray,
    error: Color::Red,
    status: Color::Cyan,
    highlight_fg: Color::Black,
    highlight_bg: Color::Gray,
    stripe_bg: Color::Reset,
    key_fg: Color::Black,
    key_bg: Color::DarkGray,
  },
];
