//! RDAP wire objects (only the members needed to build a canonical record)
use serde::Deserialize;
use serde_json::Value;

/// An RDAP domain object
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainObject {
    pub object_class_name: Option<String>,
    pub handle: Option<String>,
    pub ldh_name: Option<String>,
    pub nameservers: Option<Vec<Nameserver>>,
    pub status: Option<Vec<String>>,
    pub entities: Option<Vec<Entity>>,
    pub events: Option<Vec<Event>>,
}

impl DomainObject {
    pub fn nameservers(&self) -> &[Nameserver] {
        self.nameservers.as_deref().unwrap_or_default()
    }

    pub fn status(&self) -> &[String] {
        self.status.as_deref().unwrap_or_default()
    }

    pub fn entities(&self) -> &[Entity] {
        self.entities.as_deref().unwrap_or_default()
    }

    pub fn events(&self) -> &[Event] {
        self.events.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nameserver {
    pub ldh_name: Option<String>,
    pub unicode_name: Option<String>,
}

impl Nameserver {
    /// The host name, preferring the LDH form
    pub fn host_name(&self) -> Option<&str> {
        self.ldh_name
            .as_deref()
            .or(self.unicode_name.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub handle: Option<String>,
    pub roles: Option<Vec<String>>,
    pub vcard_array: Option<Value>,
}

impl Entity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|r| r == role)
    }

    /// Decodes the contact card, if any
    pub fn vcard(&self) -> Result<Vcard<'_>, VcardShape> {
        self.vcard_array
            .as_ref()
            .ok_or(VcardShape::Missing)
            .and_then(Vcard::try_from)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_action: Option<String>,
    pub event_date: Option<String>,
}

/// The error object returned along with non-2xx replies
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorObject {
    pub error_code: Option<u16>,
    pub title: Option<String>,
    pub description: Option<Vec<String>>,
}

/// The IANA bootstrap registry (RFC 9224)
///
/// Each service is a pair of arrays: the TLD labels and the base URLs.
#[derive(Debug, Default, Deserialize)]
pub struct BootstrapRegistry {
    pub services: Vec<(Vec<String>, Vec<String>)>,
}

impl BootstrapRegistry {
    /// The first base URL registered for `tld`, without trailing slash
    pub fn endpoint_for(&self, tld: &str) -> Option<&str> {
        self.services
            .iter()
            .filter(|(tlds, _)| tlds.iter().any(|t| t.eq_ignore_ascii_case(tld)))
            .find_map(|(_, urls)| urls.first())
            .map(|url| url.trim_end_matches('/'))
    }
}

/// Why a jCard value could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcardShape {
    Missing,
    NotAnArray,
    BadLength,
    BadEntityType,
    BadProperties,
}

/// A decoded jCard property value
#[derive(Debug, PartialEq, Eq)]
pub enum VcardValue<'a> {
    Text(&'a str),
    /// Structured values such as `org` with units or `n`
    Components(Vec<&'a str>),
    Other(&'a Value),
}

impl<'a> VcardValue<'a> {
    /// The first non empty text of the value
    pub fn first_text(&self) -> Option<&'a str> {
        match self {
            VcardValue::Text(s) => Some(*s),
            VcardValue::Components(parts) => parts.first().copied(),
            VcardValue::Other(_) => None,
        }
        .map(str::trim)
        .filter(|s| !s.is_empty())
    }
}

#[derive(Debug)]
pub struct VcardProperty<'a> {
    pub name: &'a str,
    pub value: VcardValue<'a>,
}

impl<'a> TryFrom<&'a Value> for VcardProperty<'a> {
    type Error = &'static str;

    fn try_from(v: &'a Value) -> Result<Self, Self::Error> {
        let as_ar = if let Some(ar) = v.as_array() {
            ar.as_slice()
        } else {
            return Err("Invalid Property (expected array)");
        };
        if as_ar.len() < 4 {
            return Err("Invalid Property (invalid array len)");
        }
        let name = if let Some(v) = as_ar[0].as_str() {
            v
        } else {
            return Err("Invalid Property (invalid name type)");
        };
        if !as_ar[1].is_object() {
            return Err("Invalid Property (invalid params type)");
        }
        if !as_ar[2].is_string() {
            return Err("Invalid Property (invalid value type type)");
        }
        let value = match &as_ar[3] {
            Value::String(s) => VcardValue::Text(s.as_str()),
            Value::Array(parts) if parts.iter().all(Value::is_string) => {
                VcardValue::Components(parts.iter().filter_map(Value::as_str).collect())
            }
            other => VcardValue::Other(other),
        };
        Ok(Self { name, value })
    }
}

/// A jCard (RFC 7095)
#[derive(Debug)]
pub struct Vcard<'a> {
    pub properties: Vec<VcardProperty<'a>>,
}

impl<'a> Vcard<'a> {
    /// The first non empty text of the first property called `name` that has one
    pub fn text(&self, name: &str) -> Option<&'a str> {
        self.properties
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .find_map(|p| p.value.first_text())
    }
}

impl<'a> TryFrom<&'a Value> for Vcard<'a> {
    type Error = VcardShape;

    fn try_from(v: &'a Value) -> Result<Self, Self::Error> {
        let vcard_array = v.as_array().ok_or(VcardShape::NotAnArray)?;
        if vcard_array.len() != 2 {
            return Err(VcardShape::BadLength);
        }
        if vcard_array[0].as_str() != Some("vcard") {
            return Err(VcardShape::BadEntityType);
        }
        let props_ar = vcard_array[1].as_array().ok_or(VcardShape::BadProperties)?;
        let properties = props_ar
            .iter()
            .filter_map(|p| VcardProperty::try_from(p).ok())
            .collect();
        Ok(Self { properties })
    }
}
