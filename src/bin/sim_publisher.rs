//! Publishes synthetic sensor reports to the simulated transport's
//! delivery group, for exercising a gateway without hardware.

use std::thread;
use std::time::Duration;

use clap::{App, Arg};

use fieldgate::decode::{EnvReportDecoder, Readings, SensorReport, SensorType};
use fieldgate::radio::simulated::SimulatedTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("fieldgate-sim")
        .version("0.1.0")
        .about("Synthetic field-sensor publisher for the simulated transport")
        .arg(
            Arg::with_name("device-id")
                .long("device-id")
                .value_name("ID")
                .takes_value(true)
                .default_value("7"),
        )
        .arg(
            Arg::with_name("network-id")
                .long("network-id")
                .value_name("ID")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            Arg::with_name("count")
                .long("count")
                .value_name("N")
                .help("Reports to publish; 0 publishes forever")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::with_name("interval-ms")
                .long("interval-ms")
                .value_name("MS")
                .takes_value(true)
                .default_value("5000"),
        )
        .arg(
            Arg::with_name("alerts")
                .long("alerts")
                .value_name("BITMAP")
                .takes_value(true)
                .default_value("0"),
        )
        .get_matches();

    let device_id: u16 = matches.value_of("device-id").unwrap_or("7").parse()?;
    let network_id: u16 = matches.value_of("network-id").unwrap_or("1").parse()?;
    let count: u64 = matches.value_of("count").unwrap_or("0").parse()?;
    let interval_ms: u64 = matches.value_of("interval-ms").unwrap_or("5000").parse()?;
    let alerts: u16 = matches.value_of("alerts").unwrap_or("0").parse()?;

    let transport = SimulatedTransport::join()?;
    println!("publishing as device {device_id:#06x} on network {network_id}");

    let mut published = 0u64;
    loop {
        let mut readings = Readings::new();
        // Raw units: mV, centi-degrees, tenths of mbar, centi-percent.
        readings.insert(SensorType::BatteryVolts, 3300);
        readings.insert(SensorType::Temperature, 2150 + (published % 50) as u16);
        readings.insert(SensorType::Pressure, 10132);
        readings.insert(SensorType::Humidity, 4550);

        let report = SensorReport {
            device_id,
            network_id,
            alerts,
            readings,
        };
        transport.publish(&EnvReportDecoder::encode(&report))?;
        published += 1;
        println!("published report #{published}");

        if count != 0 && published >= count {
            break;
        }
        thread::sleep(Duration::from_millis(interval_ms));
    }

    Ok(())
}
