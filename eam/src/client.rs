// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Bus-side proxies the CLI uses when it isn't privileged enough to act
//! directly: mirror images of [`crate::daemon::Root`]'s and
//! [`crate::remote_txn::RemoteTxn`]'s `#[zbus::interface]` impls.

use std::collections::HashMap;

use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::environment::{BUS_NAME, ROOT_PATH};

#[zbus::proxy(interface = "com.endlessm.AppManager", default_service = "com.endlessm.AppManager", default_path = "/com/endlessm/AppManager")]
pub trait Root {
    async fn install(&self, appid: &str) -> zbus::Result<OwnedObjectPath>;
    async fn update(&self, appid: &str) -> zbus::Result<OwnedObjectPath>;
    async fn uninstall(&self, appid: &str) -> zbus::Result<bool>;
    async fn get_user_capabilities(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

#[zbus::proxy(interface = "com.endlessm.AppManager.Transaction", default_service = "com.endlessm.AppManager")]
pub trait Transaction {
    async fn complete_transaction(&self, opts: HashMap<&str, zbus::zvariant::Value<'_>>) -> zbus::Result<bool>;
    async fn cancel_transaction(&self) -> zbus::Result<()>;
}

/// Connect to the system bus and return a [`RootProxy`] bound to this
/// daemon's well-known name and root object path.
pub async fn root(connection: &zbus::Connection) -> zbus::Result<RootProxy<'_>> {
    RootProxy::builder(connection).destination(BUS_NAME)?.path(ROOT_PATH)?.build().await
}

/// Bind a [`TransactionProxy`] to the object path an `Install`/`Update` call
/// just handed back.
pub async fn transaction<'a>(connection: &'a zbus::Connection, path: &OwnedObjectPath) -> zbus::Result<TransactionProxy<'a>> {
    TransactionProxy::builder(connection).destination(BUS_NAME)?.path(path)?.build().await
}
