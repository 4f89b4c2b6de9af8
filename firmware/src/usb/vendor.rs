//! Vendor Register Interface
//!
//! Register access over control transfers addressed to the vendor interface:
//!
//! | bmRequestType | bRequest | wValue | wIndex    | Data stage            |
//! |---------------|----------|--------|-----------|-----------------------|
//! | 0xC1 (IN)     | register | -      | interface | value, little-endian  |
//! | 0x41 (OUT)    | register | value  | interface | none                  |
//!
//! Reads are truncated to `wLength`. Anything else is left to the rest of
//! the USB stack.

use crate::registers::{RegisterMap, WriteOutcome};
use crate::types::RebootAction;

/// bmRequestType of a register read
pub const REQUEST_TYPE_READ: u8 = 0xC1;

/// bmRequestType of a register write
pub const REQUEST_TYPE_WRITE: u8 = 0x41;

/// Raw SETUP packet fields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupPacket {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength
    pub length: u16,
}

/// Register operation carried by a control transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VendorRequest {
    /// Read a register, return at most `length` bytes
    Read {
        /// Register address
        register: u8,
        /// wLength
        length: u16,
    },
    /// Write a register
    Write {
        /// Register address
        register: u8,
        /// New value
        value: u16,
    },
}

impl VendorRequest {
    /// Decode a SETUP packet aimed at `interface`, `None` if it is not ours
    #[must_use]
    pub fn decode(setup: &SetupPacket, interface: u8) -> Option<Self> {
        if setup.index != u16::from(interface) {
            return None;
        }
        match setup.request_type {
            REQUEST_TYPE_READ => Some(Self::Read {
                register: setup.request,
                length: setup.length,
            }),
            REQUEST_TYPE_WRITE => Some(Self::Write {
                register: setup.request,
                value: setup.value,
            }),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for VendorRequest {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Read { register, length } => {
                defmt::write!(f, "read {=u8:#x} ({} bytes)", register, length);
            }
            Self::Write { register, value } => {
                defmt::write!(f, "write {=u8:#x} = {}", register, value);
            }
        }
    }
}

/// How a control transfer was answered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    /// Read answered with this many bytes of the buffer
    Data(usize),
    /// Write accepted
    Accepted,
    /// Write accepted; the device must perform this action once the status
    /// stage has completed
    Terminal(RebootAction),
    /// Stall the request
    Rejected,
}

/// Execute a decoded request against the register map
///
/// Read data goes to the front of `buf`.
pub fn handle<M>(
    request: VendorRequest,
    device: &mut M,
    now_us: u32,
    buf: &mut [u8],
) -> ControlOutcome
where
    M: RegisterMap + ?Sized,
{
    match request {
        VendorRequest::Read { register, length } => match device.read_register(register, now_us) {
            Ok(value) => {
                let bytes = value.to_bytes();
                let len = bytes.len().min(usize::from(length)).min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                ControlOutcome::Data(len)
            }
            Err(_) => ControlOutcome::Rejected,
        },
        VendorRequest::Write { register, value } => {
            match device.write_register(register, value, now_us) {
                Ok(WriteOutcome::Done) => ControlOutcome::Accepted,
                Ok(WriteOutcome::Terminal(action)) => ControlOutcome::Terminal(action),
                Err(_) => ControlOutcome::Rejected,
            }
        }
    }
}

#[cfg(feature = "embedded")]
pub use self::embassy::VendorHandler;

#[cfg(feature = "embedded")]
mod embassy {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::signal::Signal;
    use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
    use embassy_usb::types::InterfaceNumber;
    use embassy_usb::Handler;

    use super::{
        handle, ControlOutcome, SetupPacket, VendorRequest, REQUEST_TYPE_READ, REQUEST_TYPE_WRITE,
    };
    use crate::hal::timer::Clock;
    use crate::registers::RegisterMap;
    use crate::types::RebootAction;

    /// `embassy-usb` handler for the vendor interface
    ///
    /// Terminal actions are posted to `reboot` so a task can carry them out
    /// after the control transfer has been acknowledged.
    pub struct VendorHandler<M, C> {
        device: M,
        clock: C,
        interface: InterfaceNumber,
        reboot: &'static Signal<CriticalSectionRawMutex, RebootAction>,
    }

    impl<M, C> VendorHandler<M, C>
    where
        M: RegisterMap,
        C: Clock,
    {
        /// Handler for the vendor interface numbered `interface`
        pub fn new(
            device: M,
            clock: C,
            interface: InterfaceNumber,
            reboot: &'static Signal<CriticalSectionRawMutex, RebootAction>,
        ) -> Self {
            Self {
                device,
                clock,
                interface,
                reboot,
            }
        }

        fn decode(&self, req: &Request, in_direction: bool) -> Option<VendorRequest> {
            if req.request_type != RequestType::Vendor || req.recipient != Recipient::Interface {
                return None;
            }
            let setup = SetupPacket {
                request_type: if in_direction {
                    REQUEST_TYPE_READ
                } else {
                    REQUEST_TYPE_WRITE
                },
                request: req.request,
                value: req.value,
                index: req.index,
                length: req.length,
            };
            VendorRequest::decode(&setup, self.interface.0)
        }
    }

    impl<M, C> Handler for VendorHandler<M, C>
    where
        M: RegisterMap,
        C: Clock,
    {
        fn control_out(&mut self, req: Request, _data: &[u8]) -> Option<OutResponse> {
            let request = self.decode(&req, false)?;
            defmt::debug!("vendor {}", request);
            let now = self.clock.now_micros();
            Some(match handle(request, &mut self.device, now, &mut []) {
                ControlOutcome::Terminal(action) => {
                    self.reboot.signal(action);
                    OutResponse::Accepted
                }
                ControlOutcome::Rejected => OutResponse::Rejected,
                ControlOutcome::Accepted | ControlOutcome::Data(_) => OutResponse::Accepted,
            })
        }

        fn control_in<'a>(
            &'a mut self,
            req: Request,
            buf: &'a mut [u8],
        ) -> Option<InResponse<'a>> {
            let request = self.decode(&req, true)?;
            defmt::debug!("vendor {}", request);
            let now = self.clock.now_micros();
            Some(match handle(request, &mut self.device, now, buf) {
                ControlOutcome::Data(len) => InResponse::Accepted(&buf[..len]),
                _ => InResponse::Rejected,
            })
        }
    }
}
