//! Pure connection configuration for the MQTT transport

use crate::transport::{ConnectOptions, TransportError};
use rumqttc::MqttOptions;
use url::Url;

/// Port used when a broker URL does not name one
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Largest packet accepted or sent, in bytes
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Split a `tcp://host:port` or `mqtt://host:port` URL into host and port
///
/// Encrypted schemes are rejected; this transport only speaks plain TCP.
pub fn parse_broker_url(broker_url: &str) -> Result<(String, u16), TransportError> {
    let url =
        Url::parse(broker_url).map_err(|_| TransportError::InvalidBrokerUrl(broker_url.to_string()))?;

    match url.scheme() {
        "tcp" | "mqtt" => {}
        other => {
            return Err(TransportError::InvalidBrokerUrl(format!(
                "unsupported scheme '{other}' in {broker_url}"
            )))
        }
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| TransportError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(DEFAULT_MQTT_PORT);

    Ok((host.to_string(), port))
}

/// Pure function to build rumqttc options from session connect options
pub fn configure_mqtt_options(options: &ConnectOptions) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(&options.client_id, &options.host, options.port);

    mqtt_options.set_keep_alive(options.keep_alive);
    // false => broker keeps our subscriptions and queued QoS 1 messages between connections
    mqtt_options.set_clean_session(options.clean_session);
    mqtt_options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    if let Some(credentials) = &options.credentials {
        mqtt_options.set_credentials(&credentials.username, &credentials.password);
    }

    mqtt_options
}
