use anyhow::Context;
use clap::Parser;
use confique::Config as _;
use log::{info, warn, LevelFilter};
use onix_daq::bridge::compose_address;
use onix_daq::composite::BreakoutBoard;
use onix_daq::devices::analog_io::AnalogIoDecoder;
use onix_daq::devices::bno055::Bno055Poller;
use onix_daq::devices::digital_io::DigitalIoDecoder;
use onix_daq::devices::heartbeat::HeartbeatDecoder;
use onix_daq::devices::neuropixels_v1::NeuropixelsV1Decoder;
use onix_daq::mock::{FrameGenerator, MockDriver};
use onix_daq::registers::{bno055, heartbeat, npix1};
use onix_daq::stats::CountingSink;
use onix_daq::{
    AcquisitionLink, AcquisitionSession, BringupTask, Conf, DeviceIndex, DeviceKind, SharedSink,
};
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const MOCK_CLOCK_HZ: u32 = 42_000_000;
const PROBE_PAYLOAD: usize = 4 * 384;

#[derive(Parser, Debug)]
#[command(about = "Headstage acquisition demo against simulated hardware")]
struct Args {
    /// TOML run configuration.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

fn init_logging(log_dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let stamp = time::OffsetDateTime::now_utc().unix_timestamp();
    let log_path = format!("{log_dir}/daq_{stamp}.log");
    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Debug,
            simplelog::Config::default(),
            std::fs::File::create(&log_path)?,
        ),
    ])?;
    info!("logging to {log_path}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let conf = Conf::builder()
        .file(&args.config)
        .load()
        .with_context(|| format!("loading {}", args.config))?;
    init_logging(&conf.run_settings.log_dir)?;

    // Device map: breakout hub carries heartbeat and both IO ports, the
    // headstage hub carries the probe and the IMU behind its deserializer.
    let breakout_hub = conf.run_settings.hub;
    let heartbeat_dev = DeviceIndex::new(breakout_hub, 0);
    let analog_dev = DeviceIndex::new(breakout_hub, 6);
    let digital_dev = DeviceIndex::new(breakout_hub, 7);
    let headstage_hub = DeviceIndex::new(breakout_hub + 1, 2);
    let probe_dev = DeviceIndex::new(breakout_hub + 1, 0);
    let imu_dev = DeviceIndex::new(breakout_hub + 1, 1);

    let mut generator = FrameGenerator::new(MOCK_CLOCK_HZ);
    generator.add_stream(heartbeat_dev, 4, 10, 0);
    generator.add_stream(analog_dev, 24, 10_000, 0);
    generator.add_stream(digital_dev, 4, 100, 0);
    if conf.probe_settings.enabled {
        generator.add_stream(probe_dev, PROBE_PAYLOAD, 30_000, 512);
    }
    let driver = MockDriver::new(MOCK_CLOCK_HZ).with_generator(generator);
    driver.set_register(heartbeat_dev, heartbeat::CLK_HZ, MOCK_CLOCK_HZ);
    driver.set_register(
        headstage_hub,
        compose_address(bno055::CHIP_ID, bno055::CHIP_ADDR),
        bno055::CHIP_ID_VALUE as u32,
    );
    driver.set_register(
        headstage_hub,
        compose_address(npix1::STATUS, npix1::CHIP_ADDR),
        npix1::SR_OK as u32,
    );
    driver.add_device(heartbeat_dev, DeviceKind::Heartbeat);
    driver.add_device(analog_dev, DeviceKind::AnalogIo);
    driver.add_device(digital_dev, DeviceKind::DigitalIo);
    driver.add_device(probe_dev, DeviceKind::NeuropixelsV1);
    driver.add_device(imu_dev, DeviceKind::Bno055);
    let link = Arc::new(AcquisitionLink::new(Box::new(driver)));

    for entry in link.device_table() {
        info!("device {}: {:?}", entry.index, entry.kind);
    }

    let sink = Arc::new(Mutex::new(CountingSink::new()));
    let shared: SharedSink = sink.clone();
    let mut session = AcquisitionSession::new(Arc::clone(&link), shared);

    session.add_decoder(Box::new(HeartbeatDecoder::new(link.clone(), heartbeat_dev)));
    match (
        conf.breakout_settings.digital_enabled,
        conf.breakout_settings.analog_enabled,
    ) {
        (true, true) => {
            session.add_decoder(Box::new(BreakoutBoard::new(
                DigitalIoDecoder::new(link.clone(), digital_dev),
                AnalogIoDecoder::new(link.clone(), analog_dev),
            )));
        }
        (true, false) => {
            session.add_decoder(Box::new(DigitalIoDecoder::new(link.clone(), digital_dev)));
        }
        (false, true) => {
            session.add_decoder(Box::new(AnalogIoDecoder::new(link.clone(), analog_dev)));
        }
        (false, false) => info!("breakout board disabled"),
    }
    if conf.probe_settings.enabled {
        let mut probe = NeuropixelsV1Decoder::new(link.clone(), probe_dev, headstage_hub);
        probe.set_settings(conf.probe_settings.to_settings());
        probe.set_baseline_schedule(
            conf.probe_settings.settle_secs,
            conf.probe_settings.baseline_samples,
        );
        match (
            &conf.probe_settings.adc_calibration,
            &conf.probe_settings.gain_calibration,
        ) {
            (Some(adc), Some(gain)) => probe.calibration_files(adc.into(), gain.into()),
            _ => warn!("no calibration files configured; probe will not activate"),
        }
        session.add_decoder(Box::new(probe));
    }
    if conf.imu_settings.enabled {
        session.add_poller(Bno055Poller::new(
            link,
            imu_dev,
            headstage_hub,
            Duration::from_millis(conf.imu_settings.poll_period_ms),
        ));
    }

    // Bring-up runs on its own thread; poll and display progress here.
    print!("Configuring...\t");
    let (tx, rx) = crossbeam_channel::bounded(1);
    let task = BringupTask::spawn(move |progress| {
        session.bring_up(Some(progress))?;
        let _ = tx.send(session);
        Ok(())
    });
    while !task.is_finished() {
        print!("\x1b[1K\rConfiguring...\t{:3}%", task.progress());
        std::io::stdout().flush()?;
        std::thread::sleep(Duration::from_millis(50));
    }
    task.join()?;
    let mut session = rx.recv().context("bring-up did not hand the session back")?;
    println!("\x1b[1K\rConfiguring...\tdone.");

    session.start()?;
    info!(
        "acquiring for {} s on mock hardware",
        conf.run_settings.run_duration
    );

    let t_end = Instant::now() + Duration::from_secs(conf.run_settings.run_duration);
    let mut last_print = Instant::now();
    while Instant::now() < t_end {
        session.process();
        if last_print.elapsed() > Duration::from_secs(1) {
            let counter = &sink.lock().unwrap().counter;
            print!(
                "\x1b[1K\rTime (s): {}\tBlocks: {}\tBlocks/s: {:.0}\tRate (MB/s): {:.2}",
                counter.t_begin.elapsed().as_secs(),
                counter.n_blocks,
                counter.block_rate(),
                counter.rate(),
            );
            std::io::stdout().flush()?;
            last_print = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    print!("\nStopping...\t");
    session.stop()?;
    println!("done.");

    let counter = &sink.lock().unwrap().counter;
    info!(
        "run complete: {} blocks, {:.2} MB, {:.2} MB/s average",
        counter.n_blocks,
        counter.total_bytes as f64 / (1024.0 * 1024.0),
        counter.average_rate(),
    );
    Ok(())
}
