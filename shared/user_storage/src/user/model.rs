//! User entity and the attribute names it is stored under

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Attribute names for the users table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "camelCase")]
pub enum UserAttribute {
    /// User ID (Primary Key)
    Id,
    /// First name
    FirstName,
    /// Last name (hash key of the last name GSI)
    LastName,
    /// Age, stored as a number
    Age,
    /// Nested address map
    Address,
    /// Education, stored as a JSON string
    Education,
    /// Admin flag
    IsAdmin,
    /// Gender name
    Gender,
    /// Last write timestamp, used as the optimistic concurrency token
    LastModified,
}

/// Attribute names inside the nested `address` map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AddressAttribute {
    /// Country
    Country,
    /// Province
    Province,
    /// City
    City,
    /// Street
    Street,
    /// House number, stored as a number
    Number,
    /// Zip code
    ZipCode,
}

/// Gender of a user, stored as its upper case name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    /// Male
    Male,
    /// Female
    Female,
    /// Any other gender
    Other,
}

/// Postal address of a user or a school
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Country
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Province
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    /// City
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Street
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    /// House number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
    /// Zip code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
}

/// Schools a user attended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    /// Primary school address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_school: Option<Address>,
    /// Secondary school address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_school: Option<Address>,
    /// University address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university: Option<Address>,
}

/// User record stored in the users table
///
/// Every field except `id` is optional and absent fields are never written.
/// `last_modified` is owned by the storage layer: it is stamped on every
/// write and is the version callers hand back for conditional updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User ID (Primary Key), assigned on create when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// First name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Age
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    /// Home address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Education history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<Education>,
    /// Admin flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    /// Gender
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Timestamp of the last write made through the storage layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_attribute_names() {
        assert_eq!(UserAttribute::Id.to_string(), "id");
        assert_eq!(UserAttribute::FirstName.to_string(), "firstName");
        assert_eq!(UserAttribute::IsAdmin.to_string(), "isAdmin");
        assert_eq!(UserAttribute::LastModified.to_string(), "lastModified");
        assert_eq!(AddressAttribute::ZipCode.to_string(), "zipcode");
        assert_eq!(AddressAttribute::Number.to_string(), "number");
    }

    #[test]
    fn test_gender_names() {
        assert_eq!(Gender::Female.to_string(), "FEMALE");
        assert_eq!(Gender::from_str("OTHER").unwrap(), Gender::Other);
        assert!(Gender::from_str("female").is_err());
        assert_eq!(serde_json::to_string(&Gender::Male).unwrap(), "\"MALE\"");
    }

    #[test]
    fn test_user_json_skips_absent_fields() {
        let user = User {
            first_name: Some("Ann".to_string()),
            ..User::default()
        };

        let json: serde_json::Value = serde_json::to_value(&user).unwrap();

        assert_eq!(json, serde_json::json!({ "firstName": "Ann" }));
    }
}
