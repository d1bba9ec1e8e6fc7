//! SMC Calling Convention encoding and the vendor (SIP) function ids served
//! by the remoteproc pass-through.
//!
//! Guests pass the function id in x0 and arguments in x1-x3; results come
//! back in the same four registers.

pub const ARM_SMCCC_STD_CALL: u32 = 0;
pub const ARM_SMCCC_FAST_CALL: u32 = 1;
pub const ARM_SMCCC_TYPE_SHIFT: u32 = 31;

pub const ARM_SMCCC_CONV_32: u32 = 0;
pub const ARM_SMCCC_CONV_64: u32 = 1;
pub const ARM_SMCCC_CONV_SHIFT: u32 = 30;

pub const ARM_SMCCC_OWNER_MASK: u32 = 0x3F;
pub const ARM_SMCCC_OWNER_SHIFT: u32 = 24;
pub const ARM_SMCCC_FUNC_MASK: u32 = 0xFFFF;

pub const ARM_SMCCC_OWNER_ARCH: u32 = 0;
pub const ARM_SMCCC_OWNER_SIP: u32 = 2;

/// Build a function id, `ARM_SMCCC_CALL_VAL` style.
pub const fn call_val(kind: u32, conv: u32, owner: u32, func: u32) -> u64 {
    ((kind << ARM_SMCCC_TYPE_SHIFT)
        | (conv << ARM_SMCCC_CONV_SHIFT)
        | ((owner & ARM_SMCCC_OWNER_MASK) << ARM_SMCCC_OWNER_SHIFT)
        | (func & ARM_SMCCC_FUNC_MASK)) as u64
}

const fn sip_fast32(func: u32) -> u64 {
    call_val(ARM_SMCCC_FAST_CALL, ARM_SMCCC_CONV_32, ARM_SMCCC_OWNER_SIP, func)
}

// ── Function ids ─────────────────────────────────────────────────────
/// Ring the caller's MFIS doorbell.
pub const MFIS_SMC_TRIG: u64 = sip_fast32(0x100);
/// x1 = vdev id, x2 = device features, x3 = guest features.
pub const RPMSG_SMC_GET_VDEV_INFO: u64 = sip_fast32(0x200);
/// x1 = ring in; x1 = align, x2 = num, x3 = notify id out.
pub const RPMSG_SMC_GET_VRING_INFO: u64 = sip_fast32(0x201);
/// x1 = ring, x2 = guest physical address, x3 = notify id.
pub const RPMSG_SMC_SET_VRING_DATA: u64 = sip_fast32(0x202);

// ── Result codes ─────────────────────────────────────────────────────
pub const ARM_SMCCC_SUCCESS: u64 = 0;
pub const ARM_SMCCC_ERR_UNKNOWN_FUNCTION: u64 = -1i64 as u64;

pub const MFIS_SMC_ERR_BUSY: u64 = 0x01;
pub const MFIS_SMC_ERR_NOT_AVAILABLE: u64 = 0x02;

pub const RPROC_SMC_ERR_NOT_AVAILABLE: u64 = 0x01;

/// Guest register frame of a trapped SMC (x0-x3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SmcRegs {
    pub x0: u64,
    pub x1: u64,
    pub x2: u64,
    pub x3: u64,
}

impl SmcRegs {
    pub const fn new(x0: u64, x1: u64, x2: u64, x3: u64) -> Self {
        Self { x0, x1, x2, x3 }
    }

    /// Function id of the request.
    pub fn function_id(&self) -> u64 {
        self.x0
    }
}
