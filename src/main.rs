#![no_std]
#![no_main]

use defmt::{info, unwrap};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::{config::Config, interrupt};
use light_indicator::ble::events::{self, ControllerEvent};
use light_indicator::ble::softdevice::{self, LightServer, SoftdeviceTransport};
use light_indicator::config::{IndicationConfig, MAX_CONNECTIONS};
use light_indicator::light::Light;
use light_indicator::IndicationController;
use nrf_softdevice::{raw, Config as SdConfig, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

static SERVER: StaticCell<LightServer> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting nRF52820 S140 light indicator");

    // Configure nRF peripherals
    let mut nrf_config = Config::default();
    // Keep clear of the SoftDevice reserved priority levels (0, 1, 4)
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let _peripherals = embassy_nrf::init(nrf_config);

    let sd_config = SdConfig {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_CONNECTIONS as u8,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: MAX_CONNECTIONS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: Default::default(),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&sd_config);
    info!("SoftDevice enabled");

    let server: &'static LightServer = SERVER.init(unwrap!(LightServer::register(sd)));
    let transport = SoftdeviceTransport::new(sd, server);
    let identity_address = softdevice::identity_address(sd);

    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(controller_task(transport, server)));
    unwrap!(spawner.spawn(softdevice::advertising_task(sd, server, spawner)));

    events::event_sender()
        .send(ControllerEvent::Boot { identity_address })
        .await;
    info!("System initialized");
}

#[embassy_executor::task]
async fn controller_task(mut transport: SoftdeviceTransport, server: &'static LightServer) {
    let mut light = Light::new();
    light.on_change(events::signal_data_changed);

    let mut controller: IndicationController = IndicationController::new(server.handles(), IndicationConfig::default());
    controller
        .run(events::event_receiver(), &events::DATA_CHANGED, &mut transport, &mut light)
        .await;
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}
