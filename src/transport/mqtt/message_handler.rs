//! Pure routing of rumqttc events
//!
//! The event loop in [`super::client`] polls rumqttc and hands every event to
//! [`MessageHandler::route_mqtt_event`]; only the resulting [`EventRoute`] decides
//! what the loop does next.

use crate::transport::TransportEvent;
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                },
                Packet::PubAck(puback) => EventRoute::DeliveryComplete {
                    packet_id: puback.pkid,
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: suback.return_codes.clone(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Subscribe(pkid)) => EventRoute::SubscribeSent {
                packet_id: *pkid,
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Validate subscription success from SubAck (pure function)
    pub fn validate_subscription_success(
        return_codes: &[SubscribeReasonCode],
    ) -> Result<(), String> {
        if return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            Err(format!(
                "Subscription failed with return codes: {return_codes:?}"
            ))
        } else {
            Ok(())
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged { session_present: bool },
    /// Message received on subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker acknowledged a QoS 1 publish
    DeliveryComplete { packet_id: u16 },
    /// Subscription confirmed with return codes
    SubscriptionConfirmed {
        packet_id: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// A Subscribe packet left with this packet id; requests go out in the order made
    SubscribeSent { packet_id: u16 },
    /// Broker closed the session
    Disconnected,
    /// Our own Disconnect packet went out
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

impl EventRoute {
    /// The notification the session should see for this route, if any
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            EventRoute::MessageReceived { topic, payload } => {
                Some(TransportEvent::MessageArrived { topic, payload })
            }
            EventRoute::DeliveryComplete { packet_id } => {
                Some(TransportEvent::DeliveryComplete { packet_id })
            }
            _ => None,
        }
    }
}
