//! Definitions compiled into the binary.

/// `(origin, json)` pairs registered by
/// [`DefinitionRegistry::with_builtins`](super::DefinitionRegistry::with_builtins).
pub(super) const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    ("builtin:nexusphp", include_str!("../../definitions/nexusphp.json")),
    ("builtin:mtorrent", include_str!("../../definitions/mtorrent.json")),
];
