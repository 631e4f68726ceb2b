//! Attribute codec
//!
//! Pure functions converting between [`User`] and DynamoDB attribute maps.
//! Encoding is sparse: a field that is `None` produces no attribute at all,
//! and the encoder never emits `NULL`. Decoding treats a missing attribute
//! and a `NULL` attribute alike, as an absent field.

pub mod education;
mod error;

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

pub use error::{CodecError, CodecResult};

use crate::user::{Address, AddressAttribute, Gender, User, UserAttribute};

/// Attribute map of a stored row
pub type Item = HashMap<String, AttributeValue>;

/// Encodes a user into an attribute map
///
/// When `include_key` is false the `id` attribute is left out, which is what
/// update expressions need since the key travels separately.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the education blob cannot be
/// serialized
pub fn encode(user: &User, include_key: bool) -> CodecResult<Item> {
    let mut item = Item::new();

    if include_key {
        if let Some(id) = user.id {
            item.insert(
                UserAttribute::Id.to_string(),
                AttributeValue::S(id.to_string()),
            );
        }
    }
    put_string(&mut item, UserAttribute::FirstName, user.first_name.as_ref());
    put_string(&mut item, UserAttribute::LastName, user.last_name.as_ref());
    put_number(&mut item, UserAttribute::Age, user.age);
    if let Some(address) = &user.address {
        item.insert(
            UserAttribute::Address.to_string(),
            AttributeValue::M(encode_address(address)),
        );
    }
    if let Some(education) = &user.education {
        item.insert(
            UserAttribute::Education.to_string(),
            AttributeValue::S(education::to_blob(education)?),
        );
    }
    if let Some(is_admin) = user.is_admin {
        item.insert(
            UserAttribute::IsAdmin.to_string(),
            AttributeValue::Bool(is_admin),
        );
    }
    if let Some(gender) = user.gender {
        item.insert(
            UserAttribute::Gender.to_string(),
            AttributeValue::S(gender.to_string()),
        );
    }
    if let Some(last_modified) = user.last_modified {
        item.insert(
            UserAttribute::LastModified.to_string(),
            timestamp_value(last_modified),
        );
    }

    Ok(item)
}

/// Decodes an attribute map into a user
///
/// # Errors
///
/// Returns `CodecError::Decode` naming the field if an attribute has the
/// wrong type or holds a value that cannot be parsed (unknown gender name,
/// malformed number, id, timestamp or education blob)
pub fn decode(item: &Item) -> CodecResult<User> {
    let id = get_string(item, UserAttribute::Id)?
        .map(|s| {
            Uuid::parse_str(&s).map_err(|e| CodecError::decode(UserAttribute::Id, e.to_string()))
        })
        .transpose()?;

    let address = match present(item, UserAttribute::Address) {
        Some(AttributeValue::M(map)) => Some(decode_address(map)?),
        Some(other) => {
            return Err(CodecError::decode(
                UserAttribute::Address,
                format!("expected M, found {}", type_tag(other)),
            ))
        }
        None => None,
    };

    let education = get_string(item, UserAttribute::Education)?
        .map(|blob| education::from_blob(&blob))
        .transpose()?;

    let is_admin = match present(item, UserAttribute::IsAdmin) {
        Some(AttributeValue::Bool(value)) => Some(*value),
        Some(other) => {
            return Err(CodecError::decode(
                UserAttribute::IsAdmin,
                format!("expected BOOL, found {}", type_tag(other)),
            ))
        }
        None => None,
    };

    let gender = get_string(item, UserAttribute::Gender)?
        .map(|name| {
            Gender::from_str(&name).map_err(|_| {
                CodecError::decode(UserAttribute::Gender, format!("unknown gender `{name}`"))
            })
        })
        .transpose()?;

    let last_modified = get_string(item, UserAttribute::LastModified)?
        .map(|s| {
            parse_timestamp(&s)
                .map_err(|reason| CodecError::decode(UserAttribute::LastModified, reason))
        })
        .transpose()?;

    Ok(User {
        id,
        first_name: get_string(item, UserAttribute::FirstName)?,
        last_name: get_string(item, UserAttribute::LastName)?,
        age: get_number(item, UserAttribute::Age)?,
        address,
        education,
        is_admin,
        gender,
        last_modified,
    })
}

/// Builds the primary key attribute map for a user id
#[must_use]
pub fn key_for(id: Uuid) -> Item {
    Item::from([(
        UserAttribute::Id.to_string(),
        AttributeValue::S(id.to_string()),
    )])
}

/// Encodes a timestamp the way `lastModified` is stored
///
/// Microsecond precision with a `Z` suffix, so that a value read back and
/// re-encoded compares equal in a condition expression.
#[must_use]
pub fn timestamp_value(timestamp: DateTime<Utc>) -> AttributeValue {
    AttributeValue::S(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Parses a stored `lastModified`, accepting only the form written by
/// [`timestamp_value`]
///
/// Conditional updates compare the stored string with the re-encoded one, so
/// any other spelling of the same instant would never match.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let timestamp = DateTime::parse_from_rfc3339(s)
        .map_err(|e| e.to_string())?
        .with_timezone(&Utc);

    if timestamp.to_rfc3339_opts(SecondsFormat::Micros, true) != s {
        return Err(format!(
            "`{s}` is not a UTC timestamp with microsecond precision"
        ));
    }

    Ok(timestamp)
}

fn encode_address(address: &Address) -> Item {
    let mut map = Item::new();

    put_string(&mut map, AddressAttribute::Country, address.country.as_ref());
    put_string(&mut map, AddressAttribute::Province, address.province.as_ref());
    put_string(&mut map, AddressAttribute::Street, address.street.as_ref());
    put_string(&mut map, AddressAttribute::City, address.city.as_ref());
    put_number(&mut map, AddressAttribute::Number, address.number);
    put_string(&mut map, AddressAttribute::ZipCode, address.zip_code.as_ref());

    map
}

fn decode_address(map: &Item) -> CodecResult<Address> {
    Ok(Address {
        country: nested(get_string(map, AddressAttribute::Country))?,
        province: nested(get_string(map, AddressAttribute::Province))?,
        city: nested(get_string(map, AddressAttribute::City))?,
        street: nested(get_string(map, AddressAttribute::Street))?,
        number: nested(get_number(map, AddressAttribute::Number))?,
        zip_code: nested(get_string(map, AddressAttribute::ZipCode))?,
    })
}

/// Prefixes decode errors of nested address fields with `address.`
fn nested<T>(result: CodecResult<T>) -> CodecResult<T> {
    result.map_err(|err| match err {
        CodecError::Decode { field, reason } => CodecError::Decode {
            field: format!("{}.{field}", UserAttribute::Address),
            reason,
        },
        other => other,
    })
}

// ============================================================================
// Helper functions
// ============================================================================

fn put_string(item: &mut Item, key: impl Display, value: Option<&String>) {
    if let Some(value) = value {
        item.insert(key.to_string(), AttributeValue::S(value.clone()));
    }
}

fn put_number(item: &mut Item, key: impl Display, value: Option<i32>) {
    if let Some(value) = value {
        item.insert(key.to_string(), AttributeValue::N(value.to_string()));
    }
}

/// Looks up an attribute, treating `NULL` the same as a missing entry
fn present(item: &Item, key: impl Display) -> Option<&AttributeValue> {
    item.get(&key.to_string())
        .filter(|value| !matches!(value, AttributeValue::Null(_)))
}

/// Get an optional string attribute.
fn get_string(item: &Item, key: impl Display + Copy) -> CodecResult<Option<String>> {
    match present(item, key) {
        Some(AttributeValue::S(s)) => Ok(Some(s.clone())),
        Some(other) => Err(CodecError::decode(
            key,
            format!("expected S, found {}", type_tag(other)),
        )),
        None => Ok(None),
    }
}

/// Get an optional 32-bit number attribute.
fn get_number(item: &Item, key: impl Display + Copy) -> CodecResult<Option<i32>> {
    match present(item, key) {
        Some(AttributeValue::N(n)) => n
            .parse::<i32>()
            .map(Some)
            .map_err(|e| CodecError::decode(key, format!("invalid number `{n}`: {e}"))),
        Some(other) => Err(CodecError::decode(
            key,
            format!("expected N, found {}", type_tag(other)),
        )),
        None => Ok(None),
    }
}

fn type_tag(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::S(_) => "S",
        AttributeValue::N(_) => "N",
        AttributeValue::B(_) => "B",
        AttributeValue::Bool(_) => "BOOL",
        AttributeValue::M(_) => "M",
        AttributeValue::L(_) => "L",
        AttributeValue::Ss(_) => "SS",
        AttributeValue::Ns(_) => "NS",
        AttributeValue::Bs(_) => "BS",
        AttributeValue::Null(_) => "NULL",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Education;
    use chrono::TimeZone;

    fn sample_user() -> User {
        User {
            id: Some(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap()),
            first_name: Some("Ann".to_string()),
            last_name: Some("Jansen".to_string()),
            age: Some(34),
            address: Some(Address {
                country: Some("NL".to_string()),
                province: Some("Utrecht".to_string()),
                city: Some("Amersfoort".to_string()),
                street: Some("Stationsplein".to_string()),
                number: Some(-7),
                zip_code: Some("3818 LE".to_string()),
            }),
            education: Some(Education {
                university: Some(Address {
                    city: Some("Utrecht".to_string()),
                    ..Address::default()
                }),
                ..Education::default()
            }),
            is_admin: Some(false),
            gender: Some(Gender::Female),
            last_modified: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
        }
    }

    #[test]
    fn test_full_user_round_trip() {
        let user = sample_user();

        let item = encode(&user, true).unwrap();
        let decoded = decode(&item).unwrap();

        assert_eq!(decoded, user);
    }

    #[test]
    fn test_partial_users_round_trip() {
        let full = sample_user();
        let variants = [
            User::default(),
            User {
                age: Some(0),
                ..User::default()
            },
            User {
                address: Some(Address::default()),
                ..User::default()
            },
            User {
                id: full.id,
                gender: Some(Gender::Other),
                is_admin: Some(true),
                ..User::default()
            },
            User {
                age: None,
                address: None,
                ..full
            },
        ];

        for user in variants {
            let decoded = decode(&encode(&user, true).unwrap()).unwrap();
            assert_eq!(decoded, user);
        }
    }

    #[test]
    fn test_encoding_is_sparse() {
        let user = User {
            first_name: Some("Ann".to_string()),
            ..User::default()
        };

        let item = encode(&user, true).unwrap();

        assert_eq!(item.len(), 1);
        assert!(!item.contains_key("age"));
        assert!(item.values().all(|v| !matches!(v, AttributeValue::Null(_))));
    }

    #[test]
    fn test_address_is_sparse_nested_map() {
        let user = User {
            address: Some(Address {
                city: Some("Delft".to_string()),
                number: Some(3),
                ..Address::default()
            }),
            ..User::default()
        };

        let item = encode(&user, false).unwrap();
        let map = item["address"].as_m().unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["city"], AttributeValue::S("Delft".to_string()));
        assert_eq!(map["number"], AttributeValue::N("3".to_string()));
    }

    #[test]
    fn test_include_key_controls_id() {
        let user = sample_user();

        assert!(encode(&user, true).unwrap().contains_key("id"));
        assert!(!encode(&user, false).unwrap().contains_key("id"));
    }

    #[test]
    fn test_wire_representation() {
        let item = encode(&sample_user(), true).unwrap();

        assert_eq!(item["age"], AttributeValue::N("34".to_string()));
        assert_eq!(item["gender"], AttributeValue::S("FEMALE".to_string()));
        assert_eq!(item["isAdmin"], AttributeValue::Bool(false));
        assert_eq!(
            item["lastModified"],
            AttributeValue::S("2024-01-15T10:30:00.000000Z".to_string())
        );
        assert!(item["education"].as_s().is_ok());
    }

    #[test]
    fn test_enum_round_trip() {
        let user = User {
            gender: Some(Gender::Female),
            ..User::default()
        };

        let item = encode(&user, false).unwrap();
        assert_eq!(item["gender"], AttributeValue::S("FEMALE".to_string()));
        assert_eq!(decode(&item).unwrap().gender, Some(Gender::Female));
    }

    #[test]
    fn test_missing_age_decodes_to_none() {
        let item = Item::from([("firstName".to_string(), AttributeValue::S("Ann".to_string()))]);

        let user = decode(&item).unwrap();

        assert_eq!(user.age, None);
        assert_eq!(user.first_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_null_marker_decodes_to_none() {
        let item = Item::from([
            ("age".to_string(), AttributeValue::Null(true)),
            ("address".to_string(), AttributeValue::Null(true)),
            ("gender".to_string(), AttributeValue::Null(true)),
        ]);

        let user = decode(&item).unwrap();

        assert_eq!(user, User::default());
    }

    #[test]
    fn test_unknown_gender_is_fatal() {
        let item = Item::from([("gender".to_string(), AttributeValue::S("ROBOT".to_string()))]);

        let err = decode(&item).unwrap_err();

        assert_eq!(err.field(), "gender");
    }

    #[test]
    fn test_wrong_type_is_fatal() {
        let item = Item::from([("age".to_string(), AttributeValue::S("34".to_string()))]);

        let err = decode(&item).unwrap_err();

        assert_eq!(err.field(), "age");
    }

    #[test]
    fn test_nested_error_names_path() {
        let address = Item::from([("number".to_string(), AttributeValue::N("x".to_string()))]);
        let item = Item::from([("address".to_string(), AttributeValue::M(address))]);

        let err = decode(&item).unwrap_err();

        assert_eq!(err.field(), "address.number");
    }

    #[test]
    fn test_malformed_education_is_fatal() {
        let item = Item::from([(
            "education".to_string(),
            AttributeValue::S("[1, 2".to_string()),
        )]);

        assert_eq!(decode(&item).unwrap_err().field(), "education");
    }

    #[test]
    fn test_non_canonical_timestamp_is_fatal() {
        for stamp in [
            "2024-01-15T10:30:00Z",
            "2024-01-15T10:30:00.000000+00:00",
            "2024-01-15T11:30:00.000000+01:00",
            "2024-01-15T10:30:00.000000123Z",
        ] {
            let item = Item::from([(
                "lastModified".to_string(),
                AttributeValue::S(stamp.to_string()),
            )]);

            assert_eq!(decode(&item).unwrap_err().field(), "lastModified", "{stamp}");
        }
    }

    #[test]
    fn test_canonical_timestamp_decodes() {
        let item = Item::from([(
            "lastModified".to_string(),
            AttributeValue::S("2024-01-15T10:30:00.123456Z".to_string()),
        )]);

        let user = decode(&item).unwrap();

        assert_eq!(
            user.last_modified,
            Some(Utc.timestamp_micros(1_705_314_600_123_456).unwrap())
        );
    }

    #[test]
    fn test_key_for() {
        let id = Uuid::new_v4();

        let key = key_for(id);

        assert_eq!(key.len(), 1);
        assert_eq!(key["id"], AttributeValue::S(id.to_string()));
    }
}
