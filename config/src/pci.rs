// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI addresses in extended bus-device-function notation.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The address of a PCI function, e.g. `0000:01:00.2`.
///
/// The textual form is `<domain>:<bus>:<device>.<function>` with all fields
/// in hexadecimal.  The device number is limited to 5 bits and the function
/// number to 3 bits by the PCI specification; illegal values are not
/// representable, use [`PciAddress::new`] or the `TryFrom`/`FromStr`
/// conversions to construct one.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

impl PciAddress {
    /// The maximum legal device number (5 bits).
    pub const MAX_DEVICE: u8 = 0x1f;
    /// The maximum legal function number (3 bits).
    pub const MAX_FUNCTION: u8 = 0x7;

    /// Create a new [`PciAddress`] from raw fields.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidPciAddress`] error if the device or function
    /// number is out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        if device > Self::MAX_DEVICE {
            return Err(InvalidPciAddress::DeviceTooLarge(device));
        }
        if function > Self::MAX_FUNCTION {
            return Err(InvalidPciAddress::FunctionTooLarge(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }

    #[must_use]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// Errors that can occur when parsing or building a [`PciAddress`]
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum InvalidPciAddress {
    /// The string does not have the `dddd:bb:dd.f` shape.
    #[error("bad PCI address syntax: '{0}'")]
    Syntax(String),
    /// The device number exceeds [`PciAddress::MAX_DEVICE`].
    #[error("PCI device number {0:#x} is too large (max is {max:#x})", max = PciAddress::MAX_DEVICE)]
    DeviceTooLarge(u8),
    /// The function number exceeds [`PciAddress::MAX_FUNCTION`].
    #[error("PCI function number {0:#x} is too large (max is {max:#x})", max = PciAddress::MAX_FUNCTION)]
    FunctionTooLarge(u8),
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidPciAddress::Syntax(s.to_string());
        let (domain, rest) = s.split_once(':').ok_or_else(syntax)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(syntax)?;
        let (device, function) = rest.split_once('.').ok_or_else(syntax)?;
        if domain.len() != 4 || bus.len() != 2 || device.len() != 2 || function.len() != 1 {
            return Err(syntax());
        }
        let domain = u16::from_str_radix(domain, 16).map_err(|_| syntax())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| syntax())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| syntax())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| syntax())?;
        PciAddress::new(domain, bus, device, function)
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PciAddress> for String {
    fn from(addr: PciAddress) -> String {
        addr.to_string()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::PciAddress;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let domain = driver.produce::<u16>()?;
            let bus = driver.produce::<u8>()?;
            let device = driver.produce::<u8>()? & PciAddress::MAX_DEVICE;
            let function = driver.produce::<u8>()? & PciAddress::MAX_FUNCTION;
            Some(PciAddress {
                domain,
                bus,
                device,
                function,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let addr: PciAddress = "0000:01:00.2".parse().unwrap();
        assert_eq!(addr.domain(), 0);
        assert_eq!(addr.bus(), 1);
        assert_eq!(addr.device(), 0);
        assert_eq!(addr.function(), 2);
        assert_eq!(addr.to_string(), "0000:01:00.2");
    }

    #[test]
    fn parse_rejects_bad_syntax() {
        for bad in ["", "0000", "0000:01:00", "0000:01:00:2", "00:01:00.2", "0000:01:0.2"] {
            assert_eq!(
                PciAddress::from_str(bad).unwrap_err(),
                InvalidPciAddress::Syntax(bad.to_string()),
                "'{bad}' should not parse"
            );
        }
    }

    #[test]
    fn device_number_is_bounded() {
        assert_eq!(
            PciAddress::new(0, 0, 0x20, 0).unwrap_err(),
            InvalidPciAddress::DeviceTooLarge(0x20)
        );
        assert_eq!(
            PciAddress::from_str("0000:00:20.0").unwrap_err(),
            InvalidPciAddress::DeviceTooLarge(0x20)
        );
    }

    #[test]
    fn function_number_is_bounded() {
        assert_eq!(
            PciAddress::new(0, 0, 0, 8).unwrap_err(),
            InvalidPciAddress::FunctionTooLarge(8)
        );
        assert_eq!(
            PciAddress::from_str("0000:00:00.8").unwrap_err(),
            InvalidPciAddress::FunctionTooLarge(8)
        );
    }

    #[test]
    fn display_parse_contract() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|addr: PciAddress| {
                let rendered = addr.to_string();
                let reparsed: PciAddress = rendered.parse().expect("rendered address must parse");
                assert_eq!(reparsed, addr);
            });
    }
}
