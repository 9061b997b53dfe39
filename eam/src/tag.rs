// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The error taxonomy carried both internally (so the transaction engine can
//! classify a failure without the bus layer downcasting through four crates'
//! worth of `thiserror` enums) and externally, as a `com.endlessm.AppManager.Error.*`
//! D-Bus error name.

use std::fmt;

/// One of the fixed set of error categories a transaction, or the daemon
/// itself, can surface to a bus client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Generic unexpected failure, typically a local OS error.
    Failed,
    /// URL or manifest structure violation.
    ProtocolError,
    /// Missing or malformed bundle, manifest, or signature.
    InvalidFile,
    /// No usable network connectivity for an external-asset fetch.
    NoNetwork,
    /// No such app id in the expected place.
    UnknownPackage,
    /// Internal failure while setting up a transaction's bus object, not
    /// attributable to the caller's request.
    Unimplemented,
    /// The policy oracle itself failed.
    Authorization,
    /// The policy oracle said no.
    NotAuthorized,
    /// Destination filesystem refused the write.
    NotEnoughDiskSpace,
    /// Caller or peer-vanish cancelled the transaction.
    Cancelled,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Failed => "Failed",
            Tag::ProtocolError => "ProtocolError",
            Tag::InvalidFile => "InvalidFile",
            Tag::NoNetwork => "NoNetwork",
            Tag::UnknownPackage => "UnknownPackage",
            Tag::Unimplemented => "Unimplemented",
            Tag::Authorization => "Authorization",
            Tag::NotAuthorized => "NotAuthorized",
            Tag::NotEnoughDiskSpace => "NotEnoughDiskSpace",
            Tag::Cancelled => "Cancelled",
        }
    }

    /// Build the `BusError` variant carrying this tag and `message`, for
    /// handing straight back as an interface method's `Result::Err`.
    pub fn into_bus_error(self, message: impl Into<String>) -> BusError {
        let message = message.into();
        match self {
            Tag::Failed => BusError::Failed(message),
            Tag::ProtocolError => BusError::ProtocolError(message),
            Tag::InvalidFile => BusError::InvalidFile(message),
            Tag::NoNetwork => BusError::NoNetwork(message),
            Tag::UnknownPackage => BusError::UnknownPackage(message),
            Tag::Unimplemented => BusError::Unimplemented(message),
            Tag::Authorization => BusError::Authorization(message),
            Tag::NotAuthorized => BusError::NotAuthorized(message),
            Tag::NotEnoughDiskSpace => BusError::NotEnoughDiskSpace(message),
            Tag::Cancelled => BusError::Cancelled(message),
        }
    }
}

/// The `com.endlessm.AppManager.Error.*` D-Bus error domain. One variant per
/// [`Tag`], plus the mandatory `ZBus` escape hatch for protocol-level
/// failures the derive macro itself needs (message serialization, etc.).
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "com.endlessm.AppManager.Error")]
pub enum BusError {
    #[zbus(error)]
    ZBus(zbus::Error),
    Failed(String),
    ProtocolError(String),
    InvalidFile(String),
    NoNetwork(String),
    UnknownPackage(String),
    Unimplemented(String),
    Authorization(String),
    NotAuthorized(String),
    NotEnoughDiskSpace(String),
    Cancelled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips_through_its_name() {
        for tag in [
            Tag::Failed,
            Tag::ProtocolError,
            Tag::InvalidFile,
            Tag::NoNetwork,
            Tag::UnknownPackage,
            Tag::Unimplemented,
            Tag::Authorization,
            Tag::NotAuthorized,
            Tag::NotEnoughDiskSpace,
            Tag::Cancelled,
        ] {
            assert_eq!(tag.to_string(), tag.as_str());
        }
    }
}
