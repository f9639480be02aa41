//! Internal constants for diagram rendering.

/// Value of the `preserveAspectRatio` attribute set on rendered diagrams.
pub const PRESERVE_ASPECT_RATIO: &str = "xMidYMid meet";

/// Inline style that lets diagrams follow the page background color.
pub const BACKGROUND_STYLE: &str = "background: var(--md-default-bg-color)";
