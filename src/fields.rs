//! Canonical-field alias resolution.
//!
//! Incident sources disagree on field spellings (`description`,
//! `descripcion`, `Descripción`, ...). Each canonical field carries an
//! ordered list of accepted source keys, checked first-match-wins; when no
//! alias is present a language-appropriate placeholder is used instead.

use std::collections::BTreeMap;

/// Source keys accepted for the record id, in priority order.
pub const ID_ALIASES: &[&str] = &["id", "ID", "_id", "Identificador_incidencia"];

pub const TITLE_ALIASES: &[&str] = &["title", "titulo", "Proyecto", "nombre"];

pub const DESCRIPTION_ALIASES: &[&str] = &[
    "description",
    "descripcion",
    "Descripción",
    "desc",
    "Descripcion Problema",
    "Descripción_incidencia",
];

pub const PROJECT_ALIASES: &[&str] = &["Proyecto", "proyecto", "project"];

pub const DATE_ALIASES: &[&str] = &[
    "Fecha",
    "fecha",
    "Fecha_envío_incidencia",
    "Fecha del incidente",
];

pub const RESOLUTION_ALIASES: &[&str] = &["Solución", "solucion", "Solucion"];

pub const STATUS_ALIASES: &[&str] = &["Estado", "estado", "status"];

pub const PRIORITY_ALIASES: &[&str] = &["Prioridad", "prioridad", "priority"];

pub const DEFAULT_TITLE: &str = "Sin título";
pub const DEFAULT_PROJECT: &str = "Sin proyecto";
pub const DEFAULT_DATE: &str = "N/A";
pub const DEFAULT_RESOLUTION: &str = "No registrada";

/// Return the first alias present in `record`, or `None`.
pub fn resolve<'a>(record: &'a BTreeMap<String, String>, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|key| record.get(*key).map(String::as_str))
}

/// Like [`resolve`] but falls back to `default` when no alias matches.
pub fn resolve_or<'a>(
    record: &'a BTreeMap<String, String>,
    aliases: &[&str],
    default: &'a str,
) -> &'a str {
    resolve(record, aliases).unwrap_or(default)
}

/// True if `key` is claimed by any canonical field (including provenance),
/// meaning it must not be echoed again in the extra-field pass-through.
pub fn is_claimed(key: &str) -> bool {
    key == "source"
        || ID_ALIASES.contains(&key)
        || PROJECT_ALIASES.contains(&key)
        || DATE_ALIASES.contains(&key)
        || DESCRIPTION_ALIASES.contains(&key)
        || RESOLUTION_ALIASES.contains(&key)
        || STATUS_ALIASES.contains(&key)
        || PRIORITY_ALIASES.contains(&key)
}
