//! AirNode firmware — main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  RadioAdapter  BusAdapter  SerialAdapter  EnvSensorAdapter   │
//! │  BatteryAdc    HttpAdapter FlashAdapter   NvsAdapter         │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ──────────────────      │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │            NodeService (pure logic)                  │    │
//! │  │  Connectivity · Bus · Ingest · AQI · Update · Power  │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One cooperative tick loop, no scheduler, no preemption.

#![deny(unused_must_use)]

use anyhow::Result;
use log::info;

use airnode::adapters::device_id;
use airnode::adapters::hardware::{
    check_rollback, BatteryAdcAdapter, BusAdapter, ClockAdapter, DisplayAdapter, EnvSensorAdapter,
    FlashAdapter, HttpAdapter, RadioAdapter, SerialAdapter,
};
use airnode::adapters::log_sink::LogEventSink;
use airnode::adapters::nvs::NvsAdapter;
use airnode::app::ports::ClockPort;
use airnode::app::service::{Hardware, NodeService};
use airnode::config::NodeConfig;
use airnode::events;

/// Tick period of the cooperative loop.
const TICK_MS: u64 = 50;

/// Broker the bus session connects to once the station link is up.
const BROKER_URL: &str = "mqtt://airnode-broker.local:1883";

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("AirNode v{} starting", env!("CARGO_PKG_VERSION"));

    // A fresh OTA image must mark itself valid early or the bootloader
    // rolls back on the next reset.
    check_rollback();

    // ── 2. Identity and storage ───────────────────────────────
    let mac = device_id::read_mac();
    let id = device_id::device_id(&mac);
    info!("device id: {id}");

    let mut storage = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init: {e}"))?;

    // ── 3. Peripherals ────────────────────────────────────────
    #[cfg(target_os = "espidf")]
    let (radio, serial, env, battery_adc, mut button_pin) = {
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::hal::gpio::{PinDriver, Pull};
        use esp_idf_svc::hal::peripherals::Peripherals;
        use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartDriver};
        use esp_idf_svc::hal::units::Hertz;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs_part = EspDefaultNvsPartition::take()?;

        let radio = RadioAdapter::new(peripherals.modem, sysloop, nvs_part)?;

        // Pin assignments per `pins.rs` (gpio17 = PM_UART_TX_GPIO, etc.).
        let uart = UartDriver::new(
            peripherals.uart1,
            peripherals.pins.gpio17,
            peripherals.pins.gpio16,
            Option::<esp_idf_svc::hal::gpio::AnyIOPin>::None,
            Option::<esp_idf_svc::hal::gpio::AnyIOPin>::None,
            &UartConfig::default().baudrate(Hertz(airnode::pins::PM_UART_BAUD)),
        )?;
        let serial = SerialAdapter::new(uart);

        // Sensor and ADC bring-up is fatal: a node that cannot read its
        // own battery must not enter the tick loop.
        let env = EnvSensorAdapter::new(
            peripherals.i2c0,
            peripherals.pins.gpio21,
            peripherals.pins.gpio22,
        )
        .map_err(|e| anyhow::anyhow!("environment sensor init: {e}"))?;
        let battery_adc = BatteryAdcAdapter::new(peripherals.adc1, peripherals.pins.gpio34)
            .map_err(|e| anyhow::anyhow!("battery ADC init: {e}"))?;

        let mut button_pin = PinDriver::input(peripherals.pins.gpio0)?;
        button_pin.set_pull(Pull::Up)?;

        (radio, serial, env, battery_adc, button_pin)
    };

    #[cfg(not(target_os = "espidf"))]
    let (radio, serial, env, battery_adc) = (
        RadioAdapter::new(),
        SerialAdapter::new(),
        EnvSensorAdapter::new(),
        BatteryAdcAdapter::new(),
    );

    // ── 4. Service + hardware bundle ──────────────────────────
    let clock = ClockAdapter::new();
    let config = NodeConfig::default();
    let mut service = NodeService::new(
        config,
        id.as_str().to_string(),
        env!("CARGO_PKG_VERSION"),
        &mut storage,
        clock.now_ms(),
    );

    let mut hw = Hardware {
        radio,
        bus: BusAdapter::new(BROKER_URL),
        serial,
        env,
        battery_adc,
        http: HttpAdapter::new(),
        flash: FlashAdapter::new(),
        display: DisplayAdapter::new(),
        clock,
        storage,
        events: LogEventSink::new(),
    };

    let boot_ms = hw.clock.now_ms();
    service.boot(&mut hw.radio, &mut hw.serial, boot_ms);
    info!("system ready, entering tick loop");

    // ── 5. Tick loop ──────────────────────────────────────────
    // The button is polled and debounced into edge events; the gesture
    // driver sees the same queue an ISR producer would feed.
    #[cfg(target_os = "espidf")]
    let mut button_was_down = button_pin.is_low();

    loop {
        let now = hw.clock.now_ms();

        #[cfg(target_os = "espidf")]
        {
            let down = button_pin.is_low();
            if down != button_was_down {
                button_was_down = down;
                let edge = if down { events::Event::ButtonDown } else { events::Event::ButtonUp };
                events::push_event(edge);
            }
        }

        events::drain_events(|edge| {
            service.handle_button_edge(
                edge,
                &mut hw.radio,
                &mut hw.bus,
                &mut hw.display,
                &mut hw.events,
                now,
            );
        });

        service.tick(&mut hw, now);

        if service.ctx().reboot_requested {
            info!("reboot requested, restarting");
            restart();
        }

        sleep_ms(TICK_MS);
    }
}

fn sleep_ms(ms: u64) {
    #[cfg(target_os = "espidf")]
    esp_idf_svc::hal::delay::FreeRtos::delay_ms(ms as u32);
    #[cfg(not(target_os = "espidf"))]
    std::thread::sleep(std::time::Duration::from_millis(ms));
}

fn restart() -> ! {
    #[cfg(target_os = "espidf")]
    esp_ota::restart();
    #[cfg(not(target_os = "espidf"))]
    std::process::exit(0);
}
