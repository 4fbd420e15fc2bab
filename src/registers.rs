//! Per-device register maps.
//!
//! These named sub-addresses are the bit-exact wire contract with the
//! hardware; values must match the firmware register files.

/// Registers common to every managed device.
pub mod common {
    pub const ENABLE: u32 = 0x00;
}

/// Heartbeat / link-status monitor.
pub mod heartbeat {
    pub const ENABLE: u32 = 0x00;
    pub const CLK_DIV: u32 = 0x01;
    pub const CLK_HZ: u32 = 0x02;
}

/// Breakout analog input board.
pub mod analog_io {
    pub const ENABLE: u32 = 0x00;
    /// Per-channel direction bits (0 = input).
    pub const CH_DIR: u32 = 0x01;
    /// First of 12 consecutive per-channel input-range registers.
    pub const CH00_RANGE: u32 = 0x02;
    pub const NUM_CHANNELS: usize = 12;

    /// Input-range register encodings.
    pub const RANGE_2V5: u32 = 0;
    pub const RANGE_5V: u32 = 1;
    pub const RANGE_10V: u32 = 2;
}

/// Breakout digital/event port.
pub mod digital_io {
    pub const ENABLE: u32 = 0x00;
}

/// DS90UB9x deserializer hub carrying a headstage.
pub mod ds90ub9x {
    pub const ENABLE: u32 = 0x00;
    pub const READSZ: u32 = 0x01;
    pub const TRIGGER: u32 = 0x02;
    pub const TRIGGER_OFF: u32 = 0x03;
    pub const DATA_GATE: u32 = 0x04;
    pub const SYNC_BITS: u32 = 0x05;
    pub const MARK: u32 = 0x06;
    pub const PORT_MODE: u32 = 0x07;
    pub const PORT_LOCKED: u32 = 0x08;

    /// I2C chip addresses reachable behind the deserializer.
    pub const DES_ADDR: u32 = 0x30;
    pub const SER_ADDR: u32 = 0x58;
}

/// DS90UB953 serializer registers (one hop past the deserializer).
pub mod ds90ub953 {
    pub const GPIO10: u32 = 0x0D;
    pub const GPIO32: u32 = 0x0E;
    pub const RESET: u32 = 0x01;

    pub const GPIO_HIGH: u8 = 0x99;
    pub const GPIO_LOW: u8 = 0x88;
}

/// BNO055 inertial sensor (I2C behind the serializer, actively polled).
pub mod bno055 {
    pub const CHIP_ADDR: u32 = 0x28;

    pub const CHIP_ID: u32 = 0x00;
    pub const OPR_MODE: u32 = 0x3D;
    pub const EUL_DATA: u32 = 0x1A;
    pub const QUA_DATA: u32 = 0x20;
    pub const LIA_DATA: u32 = 0x28;
    pub const GRV_DATA: u32 = 0x2E;
    pub const TEMP: u32 = 0x34;
    pub const CALIB_STAT: u32 = 0x35;

    pub const CHIP_ID_VALUE: u8 = 0xA0;
    pub const MODE_NDOF: u8 = 0x0C;
}

/// Neuropixels 1.0 probe ASIC (I2C behind the serializer).
pub mod npix1 {
    pub const CHIP_ADDR: u32 = 0x70;
    pub const FLEX_EEPROM_ADDR: u32 = 0x50;

    pub const OP_MODE: u32 = 0x00;
    pub const REC_MOD: u32 = 0x01;
    pub const CAL_MOD: u32 = 0x02;
    pub const STATUS: u32 = 0x08;
    pub const SYNC: u32 = 0x09;
    /// Shank-connectivity shift-register chain.
    pub const SR_CHAIN1: u32 = 0x0E;
    /// Even-channel base chain.
    pub const SR_CHAIN2: u32 = 0x0C;
    /// Odd-channel base chain.
    pub const SR_CHAIN3: u32 = 0x0D;
    pub const SR_LENGTH1: u32 = 0x0F;
    pub const SR_LENGTH2: u32 = 0x10;
    pub const SOFT_RESET: u32 = 0x11;

    pub const RESET_ALL: u8 = 0xFF;
    /// Expected STATUS after a successful shift-register transfer.
    pub const SR_OK: u8 = 1 << 7;

    pub const OP_RECORD: u8 = 1 << 6;
    pub const REC_ACTIVE: u8 = 1 << 0;
}
