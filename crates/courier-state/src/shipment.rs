//! Shipment and package records.
//!
//! A shipment never stores its own status. Read it from the ledger.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use courier_core::{PackageId, ShipmentId, Timestamp, TrackingNumber, UserId, ValidationError};

use crate::guard::Parties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentType {
    #[default]
    Standard,
    Express,
    Overnight,
    SameDay,
}

impl ShipmentType {
    pub const ALL: [ShipmentType; 4] = [Self::Standard, Self::Express, Self::Overnight, Self::SameDay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Express => "express",
            Self::Overnight => "overnight",
            Self::SameDay => "same_day",
        }
    }
}

impl FromStr for ShipmentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "shipment type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    #[default]
    StackableGoods,
    NonStackableGoods,
    DangerousGoods,
    NonDangerousGoods,
    DangerousStackableGoods,
    DangerousNonStackableGoods,
}

impl PackageType {
    pub const ALL: [PackageType; 6] = [
        Self::StackableGoods,
        Self::NonStackableGoods,
        Self::DangerousGoods,
        Self::NonDangerousGoods,
        Self::DangerousStackableGoods,
        Self::DangerousNonStackableGoods,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StackableGoods => "stackable_goods",
            Self::NonStackableGoods => "non_stackable_goods",
            Self::DangerousGoods => "dangerous_goods",
            Self::NonDangerousGoods => "non_dangerous_goods",
            Self::DangerousStackableGoods => "dangerous_stackable_goods",
            Self::DangerousNonStackableGoods => "dangerous_non_stackable_goods",
        }
    }
}

impl FromStr for PackageType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "package type",
                value: s.to_string(),
            })
    }
}

// ── Package ─────────────────────────────────────────────────────────

/// Physical package owned by the user who registered it. Costs are in minor
/// currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub user_id: UserId,
    pub package_type: PackageType,
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub is_negotiable: bool,
    pub currency: String,
    pub estimated_cost: Option<i64>,
    pub final_cost: Option<i64>,
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPackage {
    pub user_id: UserId,
    pub package_type: PackageType,
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub is_negotiable: bool,
    pub currency: String,
    pub estimated_cost: Option<i64>,
}

impl NewPackage {
    pub fn validate(&self) -> Result<(), ValidationError> {
        PackageDetails {
            package_type: self.package_type,
            weight: self.weight,
            length: self.length,
            width: self.width,
            height: self.height,
            is_negotiable: self.is_negotiable,
            currency: self.currency.clone(),
            estimated_cost: self.estimated_cost,
            final_cost: None,
        }
        .validate()
    }

    pub fn into_package(self, id: PackageId, now: Timestamp) -> Package {
        Package {
            id,
            user_id: self.user_id,
            package_type: self.package_type,
            weight: self.weight,
            length: self.length,
            width: self.width,
            height: self.height,
            is_negotiable: self.is_negotiable,
            currency: self.currency,
            estimated_cost: self.estimated_cost,
            final_cost: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Owner-editable fields of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub package_type: PackageType,
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub is_negotiable: bool,
    pub currency: String,
    pub estimated_cost: Option<i64>,
    pub final_cost: Option<i64>,
}

impl PackageDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("weight", self.weight),
            ("length", self.length),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValidationError::NotPositive { field });
            }
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::UnknownVariant {
                kind: "currency code",
                value: self.currency.clone(),
            });
        }
        for (field, cost) in [
            ("estimated_cost", self.estimated_cost),
            ("final_cost", self.final_cost),
        ] {
            if matches!(cost, Some(c) if c < 0) {
                return Err(ValidationError::NotPositive { field });
            }
        }
        Ok(())
    }
}

/// Partial package update. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagePatch {
    pub package_type: Option<PackageType>,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub is_negotiable: Option<bool>,
    pub currency: Option<String>,
    pub estimated_cost: Option<i64>,
    pub final_cost: Option<i64>,
}

impl PackagePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A package update: full replacement (PUT) or patch (PATCH).
#[derive(Debug, Clone, PartialEq)]
pub enum PackageEdit {
    Replace(PackageDetails),
    Patch(PackagePatch),
}

impl PackageEdit {
    /// The details that result from applying the edit to `current`.
    pub fn resolve(self, current: PackageDetails) -> PackageDetails {
        match self {
            Self::Replace(details) => details,
            Self::Patch(patch) => PackageDetails {
                package_type: patch.package_type.unwrap_or(current.package_type),
                weight: patch.weight.unwrap_or(current.weight),
                length: patch.length.unwrap_or(current.length),
                width: patch.width.unwrap_or(current.width),
                height: patch.height.unwrap_or(current.height),
                is_negotiable: patch.is_negotiable.unwrap_or(current.is_negotiable),
                currency: patch.currency.unwrap_or(current.currency),
                estimated_cost: patch.estimated_cost.or(current.estimated_cost),
                final_cost: patch.final_cost.or(current.final_cost),
            },
        }
    }
}

impl Package {
    pub fn details(&self) -> PackageDetails {
        PackageDetails {
            package_type: self.package_type,
            weight: self.weight,
            length: self.length,
            width: self.width,
            height: self.height,
            is_negotiable: self.is_negotiable,
            currency: self.currency.clone(),
            estimated_cost: self.estimated_cost,
            final_cost: self.final_cost,
        }
    }

    pub fn set_details(&mut self, details: PackageDetails, now: Timestamp) {
        self.package_type = details.package_type;
        self.weight = details.weight;
        self.length = details.length;
        self.width = details.width;
        self.height = details.height;
        self.is_negotiable = details.is_negotiable;
        self.currency = details.currency;
        self.estimated_cost = details.estimated_cost;
        self.final_cost = details.final_cost;
        self.updated_at = now;
    }
}

// ── Shipment ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub tracking_number: TrackingNumber,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_email: Option<String>,
    pub pickup_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    pub courier_id: UserId,
    pub shipment_type: ShipmentType,
    pub package_id: PackageId,
    pub pickup_date: Option<Timestamp>,
    pub delivery_date: Option<Timestamp>,
    pub estimated_delivery: Option<Timestamp>,
    pub special_instructions: Option<String>,
    pub insurance_required: bool,
    pub signature_required: bool,
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Shipment {
    pub fn parties(&self) -> Parties {
        Parties {
            sender_id: self.sender_id,
            courier_id: self.courier_id,
        }
    }

    pub fn details(&self) -> ShipmentDetails {
        ShipmentDetails {
            sender_name: self.sender_name.clone(),
            sender_phone: self.sender_phone.clone(),
            sender_email: self.sender_email.clone(),
            pickup_address: self.pickup_address.clone(),
            recipient_name: self.recipient_name.clone(),
            recipient_phone: self.recipient_phone.clone(),
            recipient_email: self.recipient_email.clone(),
            delivery_address: self.delivery_address.clone(),
            shipment_type: self.shipment_type,
            pickup_date: self.pickup_date,
            special_instructions: self.special_instructions.clone(),
            insurance_required: self.insurance_required,
            signature_required: self.signature_required,
        }
    }

    pub fn set_details(&mut self, details: ShipmentDetails, now: Timestamp) {
        self.sender_name = details.sender_name;
        self.sender_phone = details.sender_phone;
        self.sender_email = details.sender_email;
        self.pickup_address = details.pickup_address;
        self.recipient_name = details.recipient_name;
        self.recipient_phone = details.recipient_phone;
        self.recipient_email = details.recipient_email;
        self.delivery_address = details.delivery_address;
        self.shipment_type = details.shipment_type;
        self.pickup_date = details.pickup_date;
        self.special_instructions = details.special_instructions;
        self.insurance_required = details.insurance_required;
        self.signature_required = details.signature_required;
        self.updated_at = now;
    }
}

fn require_filled(fields: [(&'static str, &str); 5]) -> Result<(), ValidationError> {
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField { field });
        }
    }
    Ok(())
}

/// Sender-editable fields of a shipment. Sender, courier, and package are
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_email: Option<String>,
    pub pickup_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    pub shipment_type: ShipmentType,
    pub pickup_date: Option<Timestamp>,
    pub special_instructions: Option<String>,
    pub insurance_required: bool,
    pub signature_required: bool,
}

impl ShipmentDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_filled([
            ("sender_name", self.sender_name.as_str()),
            ("sender_phone", self.sender_phone.as_str()),
            ("pickup_address", self.pickup_address.as_str()),
            ("recipient_name", self.recipient_name.as_str()),
            ("recipient_phone", self.recipient_phone.as_str()),
        ])
    }
}

/// Partial shipment update. `None` keeps the stored value; clearing an
/// optional field takes a replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentPatch {
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub sender_email: Option<String>,
    pub pickup_address: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    pub shipment_type: Option<ShipmentType>,
    pub pickup_date: Option<Timestamp>,
    pub special_instructions: Option<String>,
    pub insurance_required: Option<bool>,
    pub signature_required: Option<bool>,
}

impl ShipmentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A shipment update: full replacement (PUT) or patch (PATCH).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipmentEdit {
    Replace(ShipmentDetails),
    Patch(ShipmentPatch),
}

impl ShipmentEdit {
    /// The details that result from applying the edit to `current`.
    pub fn resolve(self, current: ShipmentDetails) -> ShipmentDetails {
        match self {
            Self::Replace(details) => details,
            Self::Patch(patch) => ShipmentDetails {
                sender_name: patch.sender_name.unwrap_or(current.sender_name),
                sender_phone: patch.sender_phone.unwrap_or(current.sender_phone),
                sender_email: patch.sender_email.or(current.sender_email),
                pickup_address: patch.pickup_address.unwrap_or(current.pickup_address),
                recipient_name: patch.recipient_name.unwrap_or(current.recipient_name),
                recipient_phone: patch.recipient_phone.unwrap_or(current.recipient_phone),
                recipient_email: patch.recipient_email.or(current.recipient_email),
                delivery_address: patch.delivery_address.or(current.delivery_address),
                shipment_type: patch.shipment_type.unwrap_or(current.shipment_type),
                pickup_date: patch.pickup_date.or(current.pickup_date),
                special_instructions: patch.special_instructions.or(current.special_instructions),
                insurance_required: patch.insurance_required.unwrap_or(current.insurance_required),
                signature_required: patch.signature_required.unwrap_or(current.signature_required),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipment {
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_email: Option<String>,
    pub pickup_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    pub courier_id: UserId,
    pub shipment_type: ShipmentType,
    pub package_id: PackageId,
    pub pickup_date: Option<Timestamp>,
    pub special_instructions: Option<String>,
    pub insurance_required: bool,
    pub signature_required: bool,
}

impl NewShipment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_filled([
            ("sender_name", self.sender_name.as_str()),
            ("sender_phone", self.sender_phone.as_str()),
            ("pickup_address", self.pickup_address.as_str()),
            ("recipient_name", self.recipient_name.as_str()),
            ("recipient_phone", self.recipient_phone.as_str()),
        ])
    }

    pub fn into_shipment(
        self,
        id: ShipmentId,
        tracking_number: TrackingNumber,
        now: Timestamp,
    ) -> Shipment {
        Shipment {
            id,
            tracking_number,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_phone: self.sender_phone,
            sender_email: self.sender_email,
            pickup_address: self.pickup_address,
            recipient_name: self.recipient_name,
            recipient_phone: self.recipient_phone,
            recipient_email: self.recipient_email,
            delivery_address: self.delivery_address,
            courier_id: self.courier_id,
            shipment_type: self.shipment_type,
            package_id: self.package_id,
            pickup_date: self.pickup_date,
            delivery_date: None,
            estimated_delivery: None,
            special_instructions: self.special_instructions,
            insurance_required: self.insurance_required,
            signature_required: self.signature_required,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}
