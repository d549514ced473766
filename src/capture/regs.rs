//! CSI-2 receiver register map.
//!
//! Offsets are relative to the receiver's MMIO base. Only the registers and
//! fields the capture engine programs are listed.

#![allow(missing_docs)]

pub const CTRL: u32 = 0x000;
pub const STA: u32 = 0x004;
pub const ANA: u32 = 0x008;
pub const PRI: u32 = 0x00c;
pub const CLK: u32 = 0x010;
pub const CLT: u32 = 0x014;
pub const DAT0: u32 = 0x018;
pub const DAT1: u32 = 0x01c;
pub const DLT: u32 = 0x028;
pub const CMP0: u32 = 0x02c;
pub const ICTL: u32 = 0x100;
pub const ISTA: u32 = 0x104;
pub const IDI0: u32 = 0x108;
pub const IPIPE: u32 = 0x10c;
pub const IBSA0: u32 = 0x110;
pub const IBEA0: u32 = 0x114;
pub const IBLS: u32 = 0x118;
pub const IHWIN: u32 = 0x120;
pub const IVWIN: u32 = 0x128;
pub const DCS: u32 = 0x200;
pub const MISC: u32 = 0x400;

const fn bit(n: u32) -> u32 {
    1 << n
}

const fn mask(high: u32, low: u32) -> u32 {
    (u32::MAX >> (31 - high)) & !((1 << low) - 1)
}

// CTRL
pub const CTRL_CPE: u32 = bit(0);
pub const CTRL_MEM: u32 = bit(1);
pub const CTRL_CPR: u32 = bit(2);
pub const CTRL_CPM_MASK: u32 = mask(3, 3);
pub const CTRL_CPM_CSI2: u32 = 0;
pub const CTRL_SOE: u32 = bit(4);
pub const CTRL_DCM_MASK: u32 = mask(5, 5);
pub const CTRL_DCM_STROBE: u32 = 0;
pub const CTRL_PFT_MASK: u32 = mask(11, 8);
pub const CTRL_OET_MASK: u32 = mask(20, 12);

// STA
pub const STA_SBE: u32 = bit(2);
pub const STA_PBE: u32 = bit(3);
pub const STA_HOE: u32 = bit(4);
pub const STA_PLE: u32 = bit(5);
pub const STA_SSC: u32 = bit(6);
pub const STA_CRCE: u32 = bit(7);
pub const STA_IFO: u32 = bit(9);
pub const STA_OFO: u32 = bit(10);
pub const STA_DL: u32 = bit(12);
pub const STA_PS: u32 = bit(13);
/// Receiver interrupt status.
pub const STA_IS: u32 = bit(14);
/// Packet capture 0 complete.
pub const STA_PI0: u32 = bit(15);
pub const STA_PI1: u32 = bit(16);
pub const STA_MASK_ALL: u32 = STA_DL
    | STA_SBE
    | STA_PBE
    | STA_HOE
    | STA_PLE
    | STA_SSC
    | STA_CRCE
    | STA_IFO
    | STA_OFO
    | STA_PS
    | STA_PI0
    | STA_PI1;

// ANA
pub const ANA_AR: u32 = bit(2);
pub const ANA_DDL: u32 = bit(3);
pub const ANA_CTATADJ_MASK: u32 = mask(7, 4);
pub const ANA_PTATADJ_MASK: u32 = mask(11, 8);

// PRI
pub const PRI_PE: u32 = bit(0);
pub const PRI_PT_MASK: u32 = mask(2, 1);
pub const PRI_NP_MASK: u32 = mask(7, 4);
pub const PRI_PP_MASK: u32 = mask(11, 8);
pub const PRI_BS_MASK: u32 = mask(15, 12);
pub const PRI_BL_MASK: u32 = mask(17, 16);

// CLK
pub const CLK_CLE: u32 = bit(0);
pub const CLK_CLLPE: u32 = bit(2);

// CLT
pub const CLT1_MASK: u32 = mask(7, 0);
pub const CLT2_MASK: u32 = mask(15, 8);

// DATn
pub const DAT_DLE: u32 = bit(0);
pub const DAT_DLLPE: u32 = bit(2);

// DLT
pub const DLT1_MASK: u32 = mask(7, 0);
pub const DLT2_MASK: u32 = mask(15, 8);
pub const DLT3_MASK: u32 = mask(23, 16);

// CMP0
pub const CMP_PCE: u32 = bit(31);
pub const CMP_GI: u32 = bit(9);
pub const CMP_CPH: u32 = bit(8);
pub const CMP_PCVC_MASK: u32 = mask(7, 6);
pub const CMP_PCDT_MASK: u32 = mask(5, 0);

// ICTL
pub const ICTL_FSIE: u32 = bit(0);
pub const ICTL_FEIE: u32 = bit(1);
pub const ICTL_IBOB: u32 = bit(2);
pub const ICTL_LIP_MASK: u32 = mask(6, 5);
pub const ICTL_LCIE_MASK: u32 = mask(28, 16);

// ISTA
/// Frame start.
pub const ISTA_FSI: u32 = bit(0);
/// Frame end.
pub const ISTA_FEI: u32 = bit(1);
/// Line count.
pub const ISTA_LCI: u32 = bit(2);
pub const ISTA_MASK_ALL: u32 = ISTA_FSI | ISTA_FEI | ISTA_LCI;

// IPIPE
pub const IPIPE_PUM_MASK: u32 = mask(2, 0);
pub const IPIPE_PUM_NONE: u32 = 0;
pub const IPIPE_PUM_UNPACK10: u32 = 4;
pub const IPIPE_PPM_MASK: u32 = mask(9, 7);
pub const IPIPE_PPM_NONE: u32 = 0;
pub const IPIPE_PPM_PACK16: u32 = 5;

// IDI0 data types
pub const DATA_TYPE_RAW8: u32 = 0x2a;
pub const DATA_TYPE_RAW10: u32 = 0x2b;

// MISC
pub const MISC_FL0: u32 = bit(6);
pub const MISC_FL1: u32 = bit(9);

/// Two lanes, clock enabled on each.
pub const LANE_CLOCKS_2: u32 = 0b010101;

/// Stores `value` into the bit field selected by `mask`.
#[inline]
pub fn set_field(register: &mut u32, value: u32, mask: u32) {
    debug_assert!(mask != 0);
    let shifted = value << mask.trailing_zeros();
    debug_assert!(shifted & !mask == 0, "value {value:#x} overflows mask {mask:#x}");
    *register = (*register & !mask) | (shifted & mask);
}

#[inline]
pub fn field(value: u32, mask: u32) -> u32 {
    let mut register = 0;
    set_field(&mut register, value, mask);
    register
}
