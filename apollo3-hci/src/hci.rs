//! HCI framing used by the transport.
//!
//! Frames are H4-style: one packet indicator byte followed by the packet as
//! defined by the Bluetooth Core Specification. The transport passes frames
//! through unchanged, except for [`patch_adv_own_address`].

use heapless::Vec;

use crate::error::Error;

/// H4 packet indicators.
pub mod packet_type {
    pub const COMMAND: u8 = 0x01;
    pub const ACL_DATA: u8 = 0x02;
    pub const SYNC_DATA: u8 = 0x03;
    pub const EVENT: u8 = 0x04;
    pub const ISO_DATA: u8 = 0x05;
}

/// Largest payload accepted for a single outbound packet.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Largest outbound frame (indicator byte + payload).
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + 1;

/// Largest inbound burst the controller may declare.
pub const MAX_READ_LEN: usize = 256;

/// `HCI_Read_Local_Version_Information` (OGF 0x04, OCF 0x0001), no parameters.
pub const READ_LOCAL_VERSION_INFO: [u8; 3] = [0x01, 0x10, 0x00];

/// `HCI_LE_Set_Advertising_Parameters` opcode, little endian.
const LE_SET_ADV_PARAMS: [u8; 2] = [0x06, 0x20];

/// Offset of `Own_Address_Type` in an LE Set Advertising Parameters command
/// (opcode 2, length 1, interval min 2, interval max 2, type 1).
const OWN_ADDRESS_TYPE_OFFSET: usize = 8;

/// One outbound HCI packet, stored as a ready-to-send H4 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    frame: Vec<u8, MAX_FRAME_LEN>,
}

impl OutboundPacket {
    /// Build a packet from its indicator and payload.
    pub fn new(packet_type: u8, payload: &[u8]) -> Result<Self, Error> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PacketTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut frame = Vec::new();
        unwrap!(frame.push(packet_type));
        unwrap!(frame.extend_from_slice(payload));
        Ok(Self { frame })
    }

    /// Build a packet from a complete H4 frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, Error> {
        match frame.split_first() {
            Some((packet_type, payload)) => Self::new(*packet_type, payload),
            None => Err(Error::EmptyFrame),
        }
    }

    pub fn packet_type(&self) -> u8 {
        self.frame[0]
    }

    pub fn payload(&self) -> &[u8] {
        &self.frame[1..]
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u16 {
        self.payload().len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// The frame handed to the peer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }

    pub(crate) fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.frame[1..]
    }
}

/// Force a public own-address type in LE Set Advertising Parameters.
///
/// The Apollo3 controller mishandles a random own-address type in this
/// command; the vendor driver clears byte 8 of the command payload before
/// sending it. Returns `true` if the payload was changed.
pub fn patch_adv_own_address(kind: u8, payload: &mut [u8]) -> bool {
    if kind != packet_type::COMMAND
        || payload.len() <= OWN_ADDRESS_TYPE_OFFSET
        || payload[..2] != LE_SET_ADV_PARAMS
    {
        return false;
    }

    payload[OWN_ADDRESS_TYPE_OFFSET] = 0;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let p = OutboundPacket::new(packet_type::COMMAND, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(p.as_bytes(), &[0x01, 0xAA, 0xBB, 0xCC]);
        assert_eq!(p.packet_type(), 0x01);
        assert_eq!(p.payload(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            OutboundPacket::new(packet_type::ACL_DATA, &payload),
            Err(Error::PacketTooLarge { len: 256, max: 255 })
        );
        assert!(OutboundPacket::new(packet_type::ACL_DATA, &payload[..MAX_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn largest_payload_fills_frame() {
        let payload = [0x5Au8; MAX_PAYLOAD_LEN];
        let p = OutboundPacket::new(packet_type::ACL_DATA, &payload).unwrap();
        assert_eq!(p.as_bytes().len(), MAX_FRAME_LEN);
        assert_eq!(p.packet_type(), packet_type::ACL_DATA);
        assert_eq!(p.payload(), &payload[..]);
    }

    #[test]
    fn adv_params_own_address_forced_public() {
        // opcode 0x2006, len 15, min 0x0800, max 0x0800, ADV_IND, own addr random, ...
        let mut cmd = [
            0x06, 0x20, 0x0F, 0x00, 0x08, 0x00, 0x08, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x07, 0x00,
        ];
        assert!(patch_adv_own_address(packet_type::COMMAND, &mut cmd));
        assert_eq!(cmd[8], 0);
        assert_eq!(cmd[7], 0x00);
        assert_eq!(cmd[16], 0x07);
    }

    #[test]
    fn other_commands_untouched() {
        let mut reset = [0x03, 0x0C, 0x00];
        assert!(!patch_adv_own_address(packet_type::COMMAND, &mut reset));

        let mut acl = [0x06, 0x20, 0, 0, 0, 0, 0, 0, 0x01];
        assert!(!patch_adv_own_address(packet_type::ACL_DATA, &mut acl));
        assert_eq!(acl[8], 0x01);

        let mut short = [0x06, 0x20, 0x01];
        assert!(!patch_adv_own_address(packet_type::COMMAND, &mut short));
    }
}
