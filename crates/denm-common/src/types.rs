//! Protocol enumerations and constants from the ETSI DENM schema.

/// `ItsPduHeader.messageID` value marking a DENM PDU.
pub const MESSAGE_ID_DENM: u8 = 1;

/// Default `ItsPduHeader.protocolVersion`.
pub const PROTOCOL_VERSION: u8 = 2;

/// Geographic scope of an event, as coded by the DENM schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RelevanceDistance {
    /// Event relevant within 50 m.
    #[default]
    LessThan50m = 0,
    /// Event relevant within 100 m.
    LessThan100m = 1,
    /// Event relevant within 200 m.
    LessThan200m = 2,
    /// Event relevant within 500 m.
    LessThan500m = 3,
    /// Event relevant within 1000 m.
    LessThan1000m = 4,
    /// Event relevant within 5 km.
    LessThan5km = 5,
    /// Event relevant within 10 km.
    LessThan10km = 6,
    /// Event relevant beyond 10 km.
    Over10km = 7,
}

impl RelevanceDistance {
    /// Decodes the schema value, if in range.
    #[must_use]
    pub const fn from_value(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::LessThan50m),
            1 => Some(Self::LessThan100m),
            2 => Some(Self::LessThan200m),
            3 => Some(Self::LessThan500m),
            4 => Some(Self::LessThan1000m),
            5 => Some(Self::LessThan5km),
            6 => Some(Self::LessThan10km),
            7 => Some(Self::Over10km),
            _ => None,
        }
    }
}

/// Directional scope of an event relative to the detecting station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RelevanceTrafficDirection {
    /// Event relevant for all traffic directions.
    #[default]
    AllTrafficDirections = 0,
    /// Event relevant for upstream traffic only.
    UpstreamTraffic = 1,
    /// Event relevant for downstream traffic only.
    DownstreamTraffic = 2,
    /// Event relevant for opposite traffic only.
    OppositeTraffic = 3,
}

impl RelevanceTrafficDirection {
    /// Decodes the schema value, if in range.
    #[must_use]
    pub const fn from_value(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::AllTrafficDirections),
            1 => Some(Self::UpstreamTraffic),
            2 => Some(Self::DownstreamTraffic),
            3 => Some(Self::OppositeTraffic),
            _ => None,
        }
    }
}

/// Absolute accuracy band of a reported altitude (95 % confidence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AltitudeConfidence {
    /// Within 0.01 m.
    Alt00001 = 0,
    /// Within 0.02 m.
    Alt00002 = 1,
    /// Within 0.05 m.
    Alt00005 = 2,
    /// Within 0.1 m.
    Alt00010 = 3,
    /// Within 0.2 m.
    Alt00020 = 4,
    /// Within 0.5 m.
    Alt00050 = 5,
    /// Within 1 m.
    Alt00100 = 6,
    /// Within 2 m.
    Alt00200 = 7,
    /// Within 5 m.
    Alt00500 = 8,
    /// Within 10 m.
    Alt01000 = 9,
    /// Within 20 m.
    Alt02000 = 10,
    /// Within 50 m.
    Alt05000 = 11,
    /// Within 100 m.
    Alt10000 = 12,
    /// Within 200 m.
    Alt20000 = 13,
    /// Accuracy out of range.
    OutOfRange = 14,
    /// Accuracy unavailable.
    #[default]
    Unavailable = 15,
}

impl AltitudeConfidence {
    /// Decodes the schema value, if in range.
    #[must_use]
    pub const fn from_value(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Alt00001),
            1 => Some(Self::Alt00002),
            2 => Some(Self::Alt00005),
            3 => Some(Self::Alt00010),
            4 => Some(Self::Alt00020),
            5 => Some(Self::Alt00050),
            6 => Some(Self::Alt00100),
            7 => Some(Self::Alt00200),
            8 => Some(Self::Alt00500),
            9 => Some(Self::Alt01000),
            10 => Some(Self::Alt02000),
            11 => Some(Self::Alt05000),
            12 => Some(Self::Alt10000),
            13 => Some(Self::Alt20000),
            14 => Some(Self::OutOfRange),
            15 => Some(Self::Unavailable),
            _ => None,
        }
    }
}

/// Termination state of a previously announced event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Termination {
    /// The originating station cancels its own event.
    IsCancellation = 0,
    /// Another station negates the event.
    IsNegation = 1,
}

impl Termination {
    /// Decodes the schema value, if in range.
    #[must_use]
    pub const fn from_value(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::IsCancellation),
            1 => Some(Self::IsNegation),
            _ => None,
        }
    }
}

/// DENM cause codes (`CauseCodeType`).
pub mod cause_code {
    /// Reserved value; no cause assigned.
    pub const RESERVED: u8 = 0;
    /// Abnormal traffic condition ahead.
    pub const TRAFFIC_CONDITION: u8 = 1;
    /// Accident on the road.
    pub const ACCIDENT: u8 = 2;
    /// Roadworks in progress.
    pub const ROADWORKS: u8 = 3;
    /// Road impassable.
    pub const IMPASSABILITY: u8 = 5;
    /// Reduced adhesion on the road surface.
    pub const ADVERSE_WEATHER_ADHESION: u8 = 6;
    /// Aquaplaning risk.
    pub const AQUAPLANING: u8 = 7;
    /// Hazardous surface condition.
    pub const HAZARDOUS_SURFACE_CONDITION: u8 = 9;
    /// Obstacle on the road.
    pub const HAZARDOUS_OBSTACLE_ON_ROAD: u8 = 10;
    /// Animal on the road.
    pub const HAZARDOUS_ANIMAL_ON_ROAD: u8 = 11;
    /// Human presence on the road.
    pub const HUMAN_PRESENCE_ON_ROAD: u8 = 12;
    /// Wrong-way driver.
    pub const WRONG_WAY_DRIVING: u8 = 14;
    /// Rescue and recovery work in progress.
    pub const RESCUE_AND_RECOVERY: u8 = 15;
    /// Dangerous end of queue.
    pub const DANGEROUS_END_OF_QUEUE: u8 = 27;
    /// Vehicle breakdown.
    pub const VEHICLE_BREAKDOWN: u8 = 91;
    /// Post-crash situation.
    pub const POST_CRASH: u8 = 92;
    /// Stationary vehicle.
    pub const STATIONARY_VEHICLE: u8 = 94;
    /// Emergency vehicle approaching.
    pub const EMERGENCY_VEHICLE_APPROACHING: u8 = 95;
    /// Collision risk warning.
    pub const COLLISION_RISK: u8 = 97;
    /// Signal violation warning.
    pub const SIGNAL_VIOLATION: u8 = 98;
    /// Dangerous situation (e.g. emergency braking ahead).
    pub const DANGEROUS_SITUATION: u8 = 99;
}

/// ITS station types (`StationType`).
pub mod station_type {
    /// Unknown station type.
    pub const UNKNOWN: u8 = 0;
    /// Pedestrian.
    pub const PEDESTRIAN: u8 = 1;
    /// Cyclist.
    pub const CYCLIST: u8 = 2;
    /// Moped.
    pub const MOPED: u8 = 3;
    /// Motorcycle.
    pub const MOTORCYCLE: u8 = 4;
    /// Passenger car.
    pub const PASSENGER_CAR: u8 = 5;
    /// Bus.
    pub const BUS: u8 = 6;
    /// Light truck.
    pub const LIGHT_TRUCK: u8 = 7;
    /// Heavy truck.
    pub const HEAVY_TRUCK: u8 = 8;
    /// Trailer.
    pub const TRAILER: u8 = 9;
    /// Special vehicle.
    pub const SPECIAL_VEHICLE: u8 = 10;
    /// Tram.
    pub const TRAM: u8 = 11;
    /// Roadside unit.
    pub const ROAD_SIDE_UNIT: u8 = 15;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_distance_values_round_trip() {
        for v in 0..=7u8 {
            let d = RelevanceDistance::from_value(v).unwrap();
            assert_eq!(d as u8, v);
        }
        assert!(RelevanceDistance::from_value(8).is_none());
    }

    #[test]
    fn traffic_direction_values_round_trip() {
        for v in 0..=3u8 {
            let d = RelevanceTrafficDirection::from_value(v).unwrap();
            assert_eq!(d as u8, v);
        }
        assert!(RelevanceTrafficDirection::from_value(4).is_none());
    }

    #[test]
    fn altitude_confidence_values_round_trip() {
        for v in 0..=15u8 {
            let c = AltitudeConfidence::from_value(v).unwrap();
            assert_eq!(c as u8, v);
        }
        assert!(AltitudeConfidence::from_value(16).is_none());
    }

    #[test]
    fn defaults_match_schema() {
        assert_eq!(RelevanceDistance::default(), RelevanceDistance::LessThan50m);
        assert_eq!(
            RelevanceTrafficDirection::default(),
            RelevanceTrafficDirection::AllTrafficDirections
        );
        assert_eq!(AltitudeConfidence::default(), AltitudeConfidence::Unavailable);
    }
}
