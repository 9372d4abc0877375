use super::response::{DomainObject, Entity};
use crate::CanonicalRecord;
use time::format_description::well_known;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// An event whose date could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedEvent {
    pub action: String,
    pub date: String,
}

/// The outcome of normalisation
#[derive(Debug)]
pub struct Normalized {
    pub record: CanonicalRecord,
    /// Events that were skipped, for the caller to report
    pub unparsed_events: Vec<UnparsedEvent>,
}

/// Converts an RDAP domain object into a [`CanonicalRecord`]
///
/// Never fails: anything missing or malformed is simply left out.
pub fn normalize(raw: &DomainObject, fqdn: &str) -> CanonicalRecord {
    normalize_detailed(raw, fqdn).record
}

pub fn normalize_detailed(raw: &DomainObject, fqdn: &str) -> Normalized {
    let mut record = CanonicalRecord {
        fqdn: fqdn.to_string(),
        nameservers: raw
            .nameservers()
            .iter()
            .filter_map(|ns| ns.host_name())
            .map(|s| s.to_string())
            .collect(),
        status: raw.status().iter().cloned().collect(),
        ..Default::default()
    };

    if let Some(registrar) = raw.entities().iter().find(|e| e.has_role("registrar")) {
        apply_registrar(&mut record, registrar);
    }

    let mut unparsed_events = Vec::new();
    for event in raw.events() {
        let date = match event.event_date.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => continue,
        };
        let action = event.event_action.as_deref().unwrap_or_default();
        let slot = match action {
            "registration" => &mut record.created_at,
            "expiration" => &mut record.expires_at,
            "last changed" | "last update" => &mut record.updated_at,
            _ => continue,
        };
        if slot.is_some() {
            continue;
        }
        match parse_event_date(date) {
            Some(dt) => *slot = Some(dt),
            None => unparsed_events.push(UnparsedEvent {
                action: action.to_string(),
                date: date.to_string(),
            }),
        }
    }

    Normalized {
        record,
        unparsed_events,
    }
}

fn apply_registrar(record: &mut CanonicalRecord, entity: &Entity) {
    let handle = entity.handle.as_deref().filter(|h| !h.is_empty());
    let (full_name, organization) = match entity.vcard() {
        Ok(vcard) => (vcard.text("fn"), vcard.text("org")),
        Err(_) => (None, None),
    };
    record.registrar_handle = handle.map(|s| s.to_string());
    record.registrar_organization = organization.map(|s| s.to_string());
    record.registrar_name = full_name.or(organization).or(handle).map(|s| s.to_string());
}

/// Parses an RDAP event date
///
/// RFC 3339 first, then the strict `YYYY-MM-DDTHH:MM:SSZ` form, then the
/// broader ISO 8601 grammar some registries emit.
pub fn parse_event_date(date: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(date, &well_known::Rfc3339)
        .or_else(|_| {
            PrimitiveDateTime::parse(
                date,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
            )
            .map(|dt| dt.assume_utc())
        })
        .or_else(|_| OffsetDateTime::parse(date, &well_known::Iso8601::DEFAULT))
        .ok()
}
