//! GPIO / peripheral pin assignments for the AirNode main board.
//!
//! Single source of truth — every driver references this module rather
//! than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Particulate sensor (PMS-series, UART)
// ---------------------------------------------------------------------------

/// UART TX towards the sensor (its RX pin).
pub const PM_UART_TX_GPIO: i32 = 17;
/// UART RX from the sensor (its TX pin).
pub const PM_UART_RX_GPIO: i32 = 16;
/// Sensor line rate.
pub const PM_UART_BAUD: u32 = 9600;

// ---------------------------------------------------------------------------
// Environmental sensor (BME280, I2C)
// ---------------------------------------------------------------------------

pub const ENV_I2C_SDA_GPIO: i32 = 21;
pub const ENV_I2C_SCL_GPIO: i32 = 22;
pub const ENV_I2C_ADDR: u8 = 0x76;

// ---------------------------------------------------------------------------
// Battery sense (ADC1)
// ---------------------------------------------------------------------------

/// Battery voltage through a 1:2 resistive divider.
/// ADC1 channel 6 (GPIO 34).
pub const VBAT_ADC_GPIO: i32 = 34;
/// ADC attenuation (11 dB, 0 – 3.1 V range).
pub const VBAT_ADC_ATTEN: u32 = 3;

// ---------------------------------------------------------------------------
// User input
// ---------------------------------------------------------------------------

/// Mode/provisioning button, active LOW with internal pull-up.
pub const BUTTON_GPIO: i32 = 0;
