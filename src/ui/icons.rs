//! Shared UI icons.
//!
//! Each icon falls back to plain ASCII on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Step indicators
pub static CACHED: Emoji<'_, '_> = Emoji("♻️  ", "[CACHE]");
pub static GENERATED: Emoji<'_, '_> = Emoji("🎨 ", "[GEN]");
pub static MONEY: Emoji<'_, '_> = Emoji("💰 ", "$");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
