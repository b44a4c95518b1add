//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[STOP]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Output indicators
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static CAMERA: Emoji<'_, '_> = Emoji("📷 ", "");
pub static POINTS: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
