//! Data models for the catalog
//!
//! The catalog holds five collections. Every record type implements
//! [`Record`], which tells the registry where the record lives, how it is
//! keyed, which secondary key guards updates, and how it relates to its
//! owning patient.

use crate::{
    error::{Error, Result},
    provisioner::ChannelProvisioner,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::fmt;

/// Integer identifier used by every collection except chats
pub type EntityId = i64;

/// The collections held by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Sensor devices, owned by a patient
    Devices,
    /// Running workers
    Services,
    /// Patients, created administratively
    Patients,
    /// Medications, owned by a patient
    Medications,
    /// Notification endpoints keyed by chat ID
    Chats,
}

impl Collection {
    /// All collections, in document order
    pub const ALL: [Collection; 5] = [
        Collection::Devices,
        Collection::Services,
        Collection::Patients,
        Collection::Medications,
        Collection::Chats,
    ];

    /// Document key and URL segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Devices => "devices",
            Collection::Services => "services",
            Collection::Patients => "patients",
            Collection::Medications => "medications",
            Collection::Chats => "chats",
        }
    }

    /// Key wrapping a single record in read responses
    pub fn singular(&self) -> &'static str {
        match self {
            Collection::Devices => "device",
            Collection::Services => "service",
            Collection::Patients => "patient",
            Collection::Medications => "medication",
            Collection::Chats => "chat",
        }
    }

    /// Human-readable label used in confirmations and errors
    pub fn label(&self) -> &'static str {
        match self {
            Collection::Devices => "Device",
            Collection::Services => "Service",
            Collection::Patients => "Patient",
            Collection::Medications => "Medication",
            Collection::Chats => "Chat",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a record within its collection
pub trait RecordId:
    Clone + Eq + fmt::Display + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Normalize a JSON value into this identifier type
    fn from_json(value: &Value) -> Option<Self>;

    /// Parse an identifier taken from a URL path segment
    fn parse(segment: &str) -> Result<Self>;

    /// JSON form stored in the document
    fn to_json(&self) -> Value;
}

impl RecordId for EntityId {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn parse(segment: &str) -> Result<Self> {
        segment
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("ID must be an integer, got '{}'", segment)))
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl RecordId for String {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn parse(segment: &str) -> Result<Self> {
        if segment.is_empty() {
            return Err(Error::Validation("ID must not be empty".to_string()));
        }
        Ok(segment.to_string())
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

/// A record stored in one of the catalog collections
#[async_trait]
pub trait Record: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Identifier type
    type Id: RecordId;

    /// Collection holding this record type
    const COLLECTION: Collection;

    /// Field that must match alongside the ID for an update to apply
    const SECONDARY_KEY: Option<&'static str> = None;

    /// Whether create and delete go through the channel provisioner
    const PROVISIONED: bool = false;

    /// Record identifier
    fn id(&self) -> &Self::Id;

    /// Last create or update time
    fn last_update(&self) -> Option<DateTime<Utc>>;

    /// Stamp the record as updated at `at`
    fn touch(&mut self, at: DateTime<Utc>);

    /// Records of this type in the catalog
    fn entries(catalog: &Catalog) -> &Vec<Self>;

    /// Mutable records of this type in the catalog
    fn entries_mut(catalog: &mut Catalog) -> &mut Vec<Self>;

    /// Secondary key value, for collections that declare one
    fn secondary_key(&self) -> Option<&str> {
        None
    }

    /// Owning patient, for owned collections
    fn owner(&self) -> Option<EntityId> {
        None
    }

    /// Field-level validation beyond what deserialization enforces
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Add this record to its owner's back-reference list
    fn attach(&self, _catalog: &mut Catalog) {}

    /// Remove this record from its owner's back-reference list
    fn detach(&self, _catalog: &mut Catalog) {}

    /// Carry registry-managed fields over from the stored version on update
    fn inherit(&mut self, _stored: &Self) {}

    /// Remove dependent records; returns how many were removed
    fn cascade(&self, _catalog: &mut Catalog) -> usize {
        0
    }

    /// Acquire external resources before the record is inserted
    async fn provision(&mut self, _provisioner: &dyn ChannelProvisioner) -> Result<()> {
        Ok(())
    }

    /// Release external resources before the record is removed
    async fn deprovision(&self, _provisioner: &dyn ChannelProvisioner) -> Result<()> {
        Ok(())
    }

    /// Human-readable identity, e.g. "Device with ID 3"
    fn describe(&self) -> String {
        describe::<Self>(self.id())
    }

    /// Build a record from a client-supplied JSON body
    ///
    /// Integer IDs sent as strings are normalized, any client-supplied
    /// `last_update` is discarded, and field validation is applied.
    fn from_json(body: Value) -> Result<Self> {
        let singular = Self::COLLECTION.singular();
        let Value::Object(mut fields) = body else {
            return Err(Error::Validation(format!("{} body must be a JSON object", singular)));
        };

        let raw = fields
            .get("ID")
            .ok_or_else(|| Error::Validation(format!("missing ID in {} body", singular)))?;
        let id = Self::Id::from_json(raw).ok_or_else(|| {
            Error::Validation(format!("invalid ID {} in {} body", raw, singular))
        })?;
        fields.insert("ID".to_string(), id.to_json());

        if let Some(owner) = fields.get("patientID").and_then(EntityId::from_json) {
            fields.insert("patientID".to_string(), Value::from(owner));
        }
        fields.remove("last_update");

        let record: Self = serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::Validation(format!("invalid {} body: {}", singular, e)))?;
        record.validate()?;
        Ok(record)
    }
}

/// Human-readable identity of a record by collection and ID
pub fn describe<R: Record>(id: &R::Id) -> String {
    format!("{} with ID {}", R::COLLECTION.label(), id)
}

/// `last_update` wire format: floating-point UNIX seconds
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as fractional seconds since the epoch
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_f64(at.timestamp_micros() as f64 / 1_000_000.0),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from fractional seconds since the epoch
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let seconds = Option::<f64>::deserialize(deserializer)?;
        Ok(seconds.and_then(|s| DateTime::from_timestamp_micros((s * 1_000_000.0).round() as i64)))
    }
}

/// Patient back-reference lists
///
/// Written as plain IDs; older snapshots hold `{"deviceID": n}` and
/// `{"medicationID": n}` objects instead, which are read as their ID.
mod back_references {
    use super::{EntityId, RecordId};
    use serde::{Deserialize, Deserializer, de::Error};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<EntityId>, D::Error> {
        Vec::<Value>::deserialize(deserializer)?
            .iter()
            .map(|entry| {
                let raw = match entry {
                    Value::Object(fields) => {
                        fields.get("deviceID").or_else(|| fields.get("medicationID"))
                    }
                    other => Some(other),
                };
                raw.and_then(<EntityId as RecordId>::from_json)
                    .ok_or_else(|| D::Error::custom(format!("invalid back-reference {}", entry)))
            })
            .collect()
    }
}

/// A sensor device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device ID
    #[serde(rename = "ID")]
    pub id: EntityId,

    /// Kind of sensor; secondary key for updates
    #[serde(rename = "deviceType", default)]
    pub device_type: String,

    /// Owning patient
    #[serde(rename = "patientID")]
    pub patient_id: EntityId,

    /// Measurement unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Value>,

    /// Commands the device accepts
    #[serde(default)]
    pub commands: Vec<String>,

    /// Liveness timestamp
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Client-defined attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    /// Create a device record
    pub fn new(id: EntityId, device_type: impl Into<String>, patient_id: EntityId) -> Self {
        Self {
            id,
            device_type: device_type.into(),
            patient_id,
            unit: None,
            commands: Vec::new(),
            last_update: None,
            extra: Map::new(),
        }
    }
}

#[async_trait]
impl Record for Device {
    type Id = EntityId;
    const COLLECTION: Collection = Collection::Devices;
    const SECONDARY_KEY: Option<&'static str> = Some("deviceType");

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }

    fn entries(catalog: &Catalog) -> &Vec<Self> {
        &catalog.devices
    }

    fn entries_mut(catalog: &mut Catalog) -> &mut Vec<Self> {
        &mut catalog.devices
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.device_type)
    }

    fn owner(&self) -> Option<EntityId> {
        Some(self.patient_id)
    }

    fn attach(&self, catalog: &mut Catalog) {
        if let Some(patient) = catalog.patient_mut(self.patient_id) {
            if !patient.devices.contains(&self.id) {
                patient.devices.push(self.id);
            }
        }
    }

    fn detach(&self, catalog: &mut Catalog) {
        if let Some(patient) = catalog.patient_mut(self.patient_id) {
            patient.devices.retain(|id| *id != self.id);
        }
    }
}

/// A running worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Service ID
    #[serde(rename = "ID")]
    pub id: EntityId,

    /// Service name; secondary key for updates
    #[serde(rename = "serviceName", default)]
    pub service_name: String,

    /// Liveness timestamp
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Client-defined attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Service {
    /// Create a service record
    pub fn new(id: EntityId, service_name: impl Into<String>) -> Self {
        Self {
            id,
            service_name: service_name.into(),
            last_update: None,
            extra: Map::new(),
        }
    }
}

#[async_trait]
impl Record for Service {
    type Id = EntityId;
    const COLLECTION: Collection = Collection::Services;
    const SECONDARY_KEY: Option<&'static str> = Some("serviceName");

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }

    fn entries(catalog: &Catalog) -> &Vec<Self> {
        &catalog.services
    }

    fn entries_mut(catalog: &mut Catalog) -> &mut Vec<Self> {
        &mut catalog.services
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.service_name)
    }
}

/// Credentials of a patient's analytics channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel identifier at the analytics provider
    #[serde(rename = "channelID", default)]
    pub channel_id: Option<i64>,

    /// Key used to read channel data
    #[serde(default)]
    pub read_api_key: Option<String>,

    /// Key used to upload channel data
    #[serde(default)]
    pub write_api_key: Option<String>,
}

/// A patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Patient ID
    #[serde(rename = "ID")]
    pub id: EntityId,

    /// First name
    #[serde(default)]
    pub name: String,

    /// Last name
    #[serde(default)]
    pub surname: String,

    /// Age in years
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    /// IDs of devices owned by this patient
    #[serde(default, deserialize_with = "back_references::deserialize")]
    pub devices: Vec<EntityId>,

    /// IDs of medications owned by this patient
    #[serde(default, deserialize_with = "back_references::deserialize")]
    pub medications: Vec<EntityId>,

    /// Analytics channel provisioned at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thingspeak_info: Option<ChannelInfo>,

    /// Last create or update time
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Client-defined attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patient {
    /// Create a patient record
    pub fn new(id: EntityId, name: impl Into<String>, surname: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            surname: surname.into(),
            age: None,
            devices: Vec::new(),
            medications: Vec::new(),
            thingspeak_info: None,
            last_update: None,
            extra: Map::new(),
        }
    }
}

#[async_trait]
impl Record for Patient {
    type Id = EntityId;
    const COLLECTION: Collection = Collection::Patients;
    const PROVISIONED: bool = true;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }

    fn entries(catalog: &Catalog) -> &Vec<Self> {
        &catalog.patients
    }

    fn entries_mut(catalog: &mut Catalog) -> &mut Vec<Self> {
        &mut catalog.patients
    }

    fn inherit(&mut self, stored: &Self) {
        self.devices = stored.devices.clone();
        self.medications = stored.medications.clone();
        self.thingspeak_info = stored.thingspeak_info.clone();
    }

    fn cascade(&self, catalog: &mut Catalog) -> usize {
        let before = catalog.devices.len() + catalog.medications.len();
        catalog.devices.retain(|d| d.patient_id != self.id);
        catalog.medications.retain(|m| m.patient_id != self.id);
        before - catalog.devices.len() - catalog.medications.len()
    }

    async fn provision(&mut self, provisioner: &dyn ChannelProvisioner) -> Result<()> {
        let channel = provisioner.create_channel(self.id).await?;
        self.thingspeak_info = Some(channel);
        self.devices.clear();
        self.medications.clear();
        Ok(())
    }

    async fn deprovision(&self, provisioner: &dyn ChannelProvisioner) -> Result<()> {
        provisioner.delete_channel(self.id).await
    }
}

/// A medication schedule entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    /// Medication ID
    #[serde(rename = "ID")]
    pub id: EntityId,

    /// Owning patient
    #[serde(rename = "patientID")]
    pub patient_id: EntityId,

    /// Drug name
    #[serde(default)]
    pub name: String,

    /// Dose description
    #[serde(default)]
    pub dosage: String,

    /// Hour of day the dose is due, 0 to 23
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,

    /// Last create or update time
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Client-defined attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Medication {
    /// Create a medication record
    pub fn new(id: EntityId, patient_id: EntityId, name: impl Into<String>, hour: u8) -> Self {
        Self {
            id,
            patient_id,
            name: name.into(),
            dosage: String::new(),
            hour: Some(hour),
            last_update: None,
            extra: Map::new(),
        }
    }
}

#[async_trait]
impl Record for Medication {
    type Id = EntityId;
    const COLLECTION: Collection = Collection::Medications;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }

    fn entries(catalog: &Catalog) -> &Vec<Self> {
        &catalog.medications
    }

    fn entries_mut(catalog: &mut Catalog) -> &mut Vec<Self> {
        &mut catalog.medications
    }

    fn owner(&self) -> Option<EntityId> {
        Some(self.patient_id)
    }

    fn validate(&self) -> Result<()> {
        match self.hour {
            Some(hour) if hour > 23 => Err(Error::Validation(format!(
                "medication hour must be between 0 and 23, got {}",
                hour
            ))),
            _ => Ok(()),
        }
    }

    fn attach(&self, catalog: &mut Catalog) {
        if let Some(patient) = catalog.patient_mut(self.patient_id) {
            if !patient.medications.contains(&self.id) {
                patient.medications.push(self.id);
            }
        }
    }

    fn detach(&self, catalog: &mut Catalog) {
        if let Some(patient) = catalog.patient_mut(self.patient_id) {
            patient.medications.retain(|id| *id != self.id);
        }
    }
}

/// A registered notification endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Chat ID issued by the messaging platform
    #[serde(rename = "ID")]
    pub id: String,

    /// Last create or update time
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Client-defined attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatSession {
    /// Create a chat session record
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_update: None,
            extra: Map::new(),
        }
    }
}

#[async_trait]
impl Record for ChatSession {
    type Id = String;
    const COLLECTION: Collection = Collection::Chats;

    fn id(&self) -> &String {
        &self.id
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }

    fn entries(catalog: &Catalog) -> &Vec<Self> {
        &catalog.chats
    }

    fn entries_mut(catalog: &mut Catalog) -> &mut Vec<Self> {
        &mut catalog.chats
    }
}

/// The full catalog document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Devices collection
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Services collection
    #[serde(default)]
    pub services: Vec<Service>,
    /// Patients collection
    #[serde(default)]
    pub patients: Vec<Patient>,
    /// Medications collection
    #[serde(default)]
    pub medications: Vec<Medication>,
    /// Chat sessions collection
    #[serde(default)]
    pub chats: Vec<ChatSession>,
}

impl Catalog {
    /// Whether a patient with this ID exists
    pub fn has_patient(&self, id: EntityId) -> bool {
        self.patients.iter().any(|p| p.id == id)
    }

    /// Mutable access to a patient by ID
    pub fn patient_mut(&mut self, id: EntityId) -> Option<&mut Patient> {
        self.patients.iter_mut().find(|p| p.id == id)
    }
}
