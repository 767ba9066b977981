// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel driver kinds and the driver-bind seam.

use config::PciAddress;
use std::fmt::{Display, Formatter};
use std::io;

/// The kernel driver a VF must be bound to before it can be handed out.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum DriverKind {
    /// The default kernel network driver.
    #[serde(rename = "kernel")]
    Kernel,
    /// The VFIO passthrough driver.
    #[serde(rename = "vfio-pci")]
    VfioPci,
}

impl Display for DriverKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DriverKind::Kernel => "kernel",
            DriverKind::VfioPci => "vfio-pci",
        })
    }
}

/// The external collaborator performing the actual (un)binding; sysfs
/// writes and driver-override plumbing live behind this seam, not in the
/// resource pool.  Implementations may block; the pool commits its own
/// state before calling in and compensates if the bind fails.
pub trait DriverBinder: Send + Sync {
    /// Bind the VF at `addr` to `driver`, detaching whatever driver holds
    /// it now.
    ///
    /// # Errors
    ///
    /// Propagates the underlying syscall/filesystem failure.
    fn bind(&self, addr: &PciAddress, driver: DriverKind) -> io::Result<()>;

    /// Detach the VF at `addr` from its current driver.
    ///
    /// # Errors
    ///
    /// Propagates the underlying syscall/filesystem failure.
    fn unbind(&self, addr: &PciAddress) -> io::Result<()>;
}

impl<'a, B: DriverBinder + ?Sized> DriverBinder for &'a B {
    fn bind(&self, addr: &PciAddress, driver: DriverKind) -> io::Result<()> {
        (**self).bind(addr, driver)
    }

    fn unbind(&self, addr: &PciAddress) -> io::Result<()> {
        (**self).unbind(addr)
    }
}

impl<B: DriverBinder + ?Sized> DriverBinder for std::sync::Arc<B> {
    fn bind(&self, addr: &PciAddress, driver: DriverKind) -> io::Result<()> {
        (**self).bind(addr, driver)
    }

    fn unbind(&self, addr: &PciAddress) -> io::Result<()> {
        (**self).unbind(addr)
    }
}
