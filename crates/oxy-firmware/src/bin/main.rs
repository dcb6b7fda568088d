#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::Delay;
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{LevelFilter, info};

use oxy_core::config::{Co2Settings, Spo2Calibration, Spo2Settings};
use oxy_core::dispatch::{
    Button, Dispatcher, get_result_receiver, get_result_sender, get_task_receiver,
    get_task_sender,
};
use oxy_core::measurement::{Co2Engine, Spo2Engine};
use oxy_core::sensors::max30102::Max30102Config;
use oxy_core::sensors::{Max30102, Stc31};
use oxy_firmware::FirmwareDispatcher;
use oxy_firmware::hardware::{button_input, create_i2c_bus, share_i2c_bus};
use oxy_firmware::tasks::{
    SignalTimers, button_task, co2_tick_task, result_log_task, spo2_timer_task,
};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "the dispatcher owns the SpO2 window buffer and lives in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let i2c = create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11)
        .expect("Failed to configure I2C0");
    let (i2c_for_max30102, i2c_for_stc31) = share_i2c_bus(i2c);

    let co2_settings = Co2Settings::default();
    let spo2 = Spo2Engine::new(
        Max30102::new(i2c_for_max30102, Max30102Config::default()),
        Spo2Settings::with_calibration(Spo2Calibration::FITTED_101_72),
    );
    let co2 = Co2Engine::new(Stc31::new(i2c_for_stc31, Delay, co2_settings));

    let mut dispatcher: FirmwareDispatcher =
        Dispatcher::new(spo2, co2, get_result_sender(), SignalTimers);
    dispatcher.init().await;

    let spo2_button = button_input(peripherals.GPIO1);
    let co2_button = button_input(peripherals.GPIO2);

    spawner.spawn(spo2_timer_task(get_task_sender()).expect("spo2 timer task"));
    spawner.spawn(
        co2_tick_task(get_task_sender(), co2_settings.tick_interval()).expect("co2 tick task"),
    );
    spawner.spawn(
        button_task(spo2_button, Button::Spo2, get_task_sender()).expect("spo2 button task"),
    );
    spawner.spawn(
        button_task(co2_button, Button::Co2, get_task_sender()).expect("co2 button task"),
    );
    spawner.spawn(result_log_task(get_result_receiver()).expect("result log task"));

    info!("Press the SpO2 or CO2 button to start a measurement");

    dispatcher.run(get_task_receiver()).await
}
