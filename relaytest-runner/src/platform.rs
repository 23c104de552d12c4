// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Descriptive metadata about the device running the tests.
//!
//! The metadata only ever ends up in the report preamble. Embedders with better sources (a
//! mobile platform API, say) implement [`DeviceInfoProvider`]; everyone else uses
//! [`HostDeviceInfo`].

use std::env;

/// Strings describing the device, written at the start of every report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    /// The device model or hardware architecture.
    pub model: String,

    /// The name of the operating system.
    pub system_name: String,

    /// The version of the operating system.
    pub system_version: String,

    /// The name of the device.
    pub name: String,

    /// The current locale identifier, e.g. `en_US`.
    pub locale: String,

    /// The identifier of the application bundle being tested.
    pub bundle_id: String,
}

/// Supplies [`DeviceInfo`] when a run starts.
///
/// Implemented for any `Fn() -> DeviceInfo`.
pub trait DeviceInfoProvider: Send + Sync {
    /// Returns information about the current device.
    fn device_info(&self) -> DeviceInfo;
}

impl<F> DeviceInfoProvider for F
where
    F: Fn() -> DeviceInfo + Send + Sync,
{
    fn device_info(&self) -> DeviceInfo {
        self()
    }
}

/// Describes the host relaytest is running on, from the environment and the OS.
#[derive(Clone, Debug)]
pub struct HostDeviceInfo {
    bundle_id: String,
}

impl HostDeviceInfo {
    /// Creates a provider that reports `bundle_id` as the bundle identifier.
    pub fn new(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
        }
    }
}

impl Default for HostDeviceInfo {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

impl DeviceInfoProvider for HostDeviceInfo {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            model: env::consts::ARCH.to_owned(),
            system_name: env::consts::OS.to_owned(),
            system_version: os_version(),
            name: host_name(),
            locale: locale_from(|key| env::var(key).ok()),
            bundle_id: self.bundle_id.clone(),
        }
    }
}

fn os_version() -> String {
    if cfg!(target_os = "linux") {
        if let Ok(release) = std::fs::read_to_string("/proc/sys/kernel/osrelease") {
            return release.trim().to_owned();
        }
    }
    "unknown".to_owned()
}

fn host_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .chain(
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_owned()),
        )
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// Reads the locale the same way POSIX does, dropping the encoding and modifier.
fn locale_from(var: impl Fn(&str) -> Option<String>) -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .into_iter()
        .filter_map(var)
        .find(|value| !value.is_empty())
        .map(|value| {
            let end = value.find(['.', '@']).unwrap_or(value.len());
            value[..end].to_owned()
        })
        .unwrap_or_else(|| "C".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(&[("LANG", "en_US.UTF-8")], "en_US"; "encoding stripped")]
    #[test_case(&[("LC_ALL", "de_DE@euro"), ("LANG", "en_US")], "de_DE"; "lc_all wins")]
    #[test_case(&[("LC_ALL", ""), ("LC_MESSAGES", "fr_FR")], "fr_FR"; "empty skipped")]
    #[test_case(&[], "C"; "fallback")]
    fn locale_resolution(vars: &[(&str, &str)], expected: &str) {
        let locale = locale_from(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        });
        assert_eq!(locale, expected);
    }

    #[test]
    fn closures_are_providers() {
        let provider = || DeviceInfo {
            model: "iPhone".to_owned(),
            system_name: "iOS".to_owned(),
            system_version: "17.0".to_owned(),
            name: "test-device".to_owned(),
            locale: "en_US".to_owned(),
            bundle_id: "com.example.tests".to_owned(),
        };
        assert_eq!(provider.device_info().model, "iPhone");
    }

    #[test]
    fn host_info_is_populated() {
        let info = HostDeviceInfo::new("com.example.tests").device_info();
        assert_eq!(info.model, env::consts::ARCH);
        assert_eq!(info.system_name, env::consts::OS);
        assert!(!info.name.is_empty());
        assert_eq!(info.bundle_id, "com.example.tests");
    }
}
