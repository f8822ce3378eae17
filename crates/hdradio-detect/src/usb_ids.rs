//! USB Vendor/Product ID database for tuner cables and bridge adapters
//!
//! The MJS cable is an FTDI part with its own product id. Bridges are
//! microcontroller boards, which show up behind whatever USB serial chip the
//! board carries.

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    use super::UsbId;

    pub const VID: u16 = 0x0403;

    pub const FT232R: UsbId = UsbId::new(VID, 0x6001);
    pub const FT231X: UsbId = UsbId::new(VID, 0x6015);

    /// Generic FTDI product IDs (not the MJS cable)
    pub const ALL_PIDS: &[u16] = &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015];
}

/// The MJS serial cable for DMHD-1000 tuners
pub mod mjs {
    use super::{ftdi, UsbId};

    pub const PID: u16 = 0x9378;
    pub const CABLE: UsbId = UsbId::new(ftdi::VID, PID);
}

/// Silicon Labs CP210x
pub mod cp210x {
    pub const VID: u16 = 0x10C4;
    pub const ALL_PIDS: &[u16] = &[0xEA60, 0xEA70, 0xEA71];
}

/// WCH CH340/CH341
///
/// These adapters reset the attached board on open and need a longer
/// initialization delay before the bridge answers.
pub mod ch340 {
    pub const VID: u16 = 0x1A86;
    pub const ALL_PIDS: &[u16] = &[0x7523, 0x5523];
}

/// Prolific PL2303
pub mod prolific {
    pub const VID: u16 = 0x067B;
    pub const ALL_PIDS: &[u16] = &[0x2303];
}

/// Arduino boards with native USB
pub mod arduino {
    pub const VID: u16 = 0x2341;
}

/// Check for the MJS cable
pub fn is_mjs_cable(vid: u16, pid: u16) -> bool {
    UsbId::new(vid, pid) == mjs::CABLE
}

/// Check if a VID belongs to a WCH CH34x adapter
pub fn is_ch34x(vid: u16) -> bool {
    vid == ch340::VID
}

/// Check if a VID/PID could host a microcontroller bridge
pub fn is_bridge_candidate(vid: u16, pid: u16) -> bool {
    match vid {
        ftdi::VID => !is_mjs_cable(vid, pid),
        cp210x::VID | ch340::VID | prolific::VID | arduino::VID => true,
        _ => false,
    }
}

/// Get adapter type name from VID/PID
pub fn adapter_name(vid: u16, pid: u16) -> Option<&'static str> {
    if is_mjs_cable(vid, pid) {
        return Some("MJS cable");
    }
    match vid {
        ftdi::VID => Some("FTDI"),
        cp210x::VID => Some("CP210x"),
        ch340::VID => Some("CH340"),
        prolific::VID => Some("PL2303"),
        arduino::VID => Some("Arduino"),
        _ => None,
    }
}
