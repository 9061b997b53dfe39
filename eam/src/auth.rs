// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mapping a bus-peer identity onto a boolean capability.
//!
//! Two paths, tried in order: a uid/group short-circuit that needs no bus
//! round trip, and a `polkit` policy query for everyone else.

use std::fmt;

use nix::unistd::{Uid, User};
use thiserror::Error;
use zbus_polkit::policy1::{AuthorityProxy, CheckAuthorizationFlags, Subject};

/// The operating-system group whose members are granted every capability
/// without consulting polkit. Overridable at build time; `wheel` matches
/// the admin group name used by most systemd-based distributions.
pub const ADMIN_GROUP: &str = match option_env!("EAM_ADMIN_GROUP") {
    Some(name) => name,
    None => "wheel",
};

/// The dedicated service account this daemon itself may run requests as
/// (e.g. a privileged helper invoking the CLI on a user's behalf).
pub const SERVICE_USER: &str = match option_env!("EAM_SERVICE_USER") {
    Some(name) => name,
    None => "eam",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Install,
    Update,
    Uninstall,
}

impl Capability {
    fn action_id(self) -> &'static str {
        match self {
            Capability::Install => "com.endlessm.AppManager.install",
            Capability::Update => "com.endlessm.AppManager.update",
            Capability::Uninstall => "com.endlessm.AppManager.uninstall",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_id())
    }
}

/// `true` if `uid` should bypass polkit entirely: root, the dedicated
/// service account, or a member of [`ADMIN_GROUP`].
pub fn is_privileged(uid: Uid) -> bool {
    if uid.is_root() {
        return true;
    }

    let Ok(Some(user)) = User::from_uid(uid) else { return false };
    if user.name == SERVICE_USER {
        return true;
    }

    in_admin_group(&user)
}

fn in_admin_group(user: &User) -> bool {
    let Ok(Some(admin)) = nix::unistd::Group::from_name(ADMIN_GROUP) else { return false };
    if user.gid == admin.gid {
        return true;
    }
    admin.mem.iter().any(|member| member == &user.name)
}

/// Ask polkit whether `unique_bus_name` may exercise `capability`, for the
/// purpose of performing that action. Only `is_authorized == true` counts -
/// a challenge is never treated as a green light here.
pub async fn check(proxy: &AuthorityProxy<'_>, unique_bus_name: &str, capability: Capability) -> Result<(), Error> {
    let subject = Subject::new_system_bus_name(unique_bus_name).map_err(Error::Subject)?;
    let details = std::collections::HashMap::new();
    let result = proxy
        .check_authorization(&subject, capability.action_id(), &details, CheckAuthorizationFlags::AllowUserInteraction, "")
        .await
        .map_err(Error::Polkit)?;

    if result.is_authorized {
        Ok(())
    } else {
        Err(Error::NotAuthorized(capability))
    }
}

/// Like [`check`] but a challenge also counts as "would be allowed",
/// because this is only used for capability advertisement
/// (`GetUserCapabilities`), never to gate an actual action.
pub async fn advertise(proxy: &AuthorityProxy<'_>, unique_bus_name: &str, capability: Capability) -> Result<bool, Error> {
    let subject = Subject::new_system_bus_name(unique_bus_name).map_err(Error::Subject)?;
    let details = std::collections::HashMap::new();
    let result = proxy
        .check_authorization(&subject, capability.action_id(), &details, CheckAuthorizationFlags::AllowUserInteraction, "")
        .await
        .map_err(Error::Polkit)?;

    Ok(result.is_authorized || result.is_challenge)
}

/// Look up the unix uid owning a bus connection, via
/// `org.freedesktop.DBus.GetConnectionUnixUser`.
pub async fn peer_uid(connection: &zbus::Connection, unique_bus_name: &str) -> Result<Uid, Error> {
    let dbus = zbus::fdo::DBusProxy::new(connection).await.map_err(Error::ZBus)?;
    let uid = dbus.get_connection_unix_user(unique_bus_name).await.map_err(Error::ZBus)?;
    Ok(Uid::from_raw(uid))
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not authorized")]
    NotAuthorized(Capability),
    #[error("could not reach the policy oracle")]
    Polkit(#[source] zbus::Error),
    #[error("invalid polkit subject")]
    Subject(#[source] zbus::Error),
    #[error("bus error")]
    ZBus(#[source] zbus::fdo::Error),
}

impl Error {
    pub fn tag(&self) -> crate::tag::Tag {
        match self {
            Error::NotAuthorized(_) => crate::tag::Tag::NotAuthorized,
            Error::Polkit(_) | Error::Subject(_) | Error::ZBus(_) => crate::tag::Tag::Authorization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_always_privileged() {
        assert!(is_privileged(Uid::from_raw(0)));
    }

    #[test]
    fn capability_action_ids_are_distinct() {
        let ids = [Capability::Install.action_id(), Capability::Update.action_id(), Capability::Uninstall.action_id()];
        assert_eq!(ids.len(), ids.iter().collect::<std::collections::HashSet<_>>().len());
    }
}
