use std::collections::HashMap;

use strum::IntoEnumIterator;

use super::ThemeName;

/// CSS-like variable bindings for one theme, in render order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemePalette {
    pub bindings: Vec<(&'static str, &'static str)>,
}

impl ThemePalette {
    fn new(
        bg_primary: &'static str,
        bg_secondary: &'static str,
        text_primary: &'static str,
        text_secondary: &'static str,
        border: &'static str,
        accent: &'static str,
    ) -> Self {
        Self {
            bindings: vec![
                ("--bg-primary", bg_primary),
                ("--bg-secondary", bg_secondary),
                ("--text-primary", text_primary),
                ("--text-secondary", text_secondary),
                ("--border-color", border),
                ("--accent", accent),
            ],
        }
    }

    pub fn get(&self, variable: &str) -> Option<&'static str> {
        self.bindings
            .iter()
            .find(|(name, _)| *name == variable)
            .map(|(_, value)| *value)
    }

    /// Renders the bindings as a `.theme { ... }` style block.
    pub fn to_css(&self, theme: ThemeName) -> String {
        let mut out = format!(".{theme} {{\n");
        for (name, value) in &self.bindings {
            out.push_str(&format!("  {name}: {value};\n"));
        }
        out.push_str("}\n");
        out
    }
}

#[derive(Debug, Clone)]
pub struct ThemeRegistry {
    palettes: HashMap<ThemeName, ThemePalette>,
}

impl ThemeRegistry {
    pub fn palette(&self, theme: ThemeName) -> Option<&ThemePalette> {
        self.palettes.get(&theme)
    }

    pub fn all(&self) -> impl Iterator<Item = ThemeName> + '_ {
        ThemeName::iter().filter(|theme| self.palettes.contains_key(theme))
    }
}

impl Default for ThemeRegistry {
    fn default() -> Self {
        let palettes = [
            (
                ThemeName::Light,
                ThemePalette::new("#ffffff", "#f3f4f6", "#111827", "#4b5563", "#e5e7eb", "#3b82f6"),
            ),
            (
                ThemeName::Dark,
                ThemePalette::new("#111827", "#1f2937", "#f9fafb", "#9ca3af", "#374151", "#60a5fa"),
            ),
            (
                ThemeName::Nord,
                ThemePalette::new("#2e3440", "#3b4252", "#eceff4", "#d8dee9", "#4c566a", "#88c0d0"),
            ),
            (
                ThemeName::Dracula,
                ThemePalette::new("#282a36", "#44475a", "#f8f8f2", "#6272a4", "#44475a", "#bd93f9"),
            ),
            (
                ThemeName::Monokai,
                ThemePalette::new("#272822", "#3e3d32", "#f8f8f2", "#75715e", "#49483e", "#a6e22e"),
            ),
            (
                ThemeName::Solarized,
                ThemePalette::new("#fdf6e3", "#eee8d5", "#657b83", "#93a1a1", "#eee8d5", "#268bd2"),
            ),
        ]
        .into_iter()
        .collect();
        Self { palettes }
    }
}
