//! Application close codes sent by the game server.

pub const RECONNECT_INITIATED: u16 = 4100;
pub const PLAYER_LEFT_VOLUNTARILY: u16 = 4200;
pub const USER_SESSION_SUPERSEDED: u16 = 4250;
pub const CONNECTION_SUPERSEDED: u16 = 4300;
pub const SERVER_DISPOSED: u16 = 4310;
pub const HEARTBEAT_EXPIRED: u16 = 4400;
pub const PLAYER_KICKED: u16 = 4500;
/// The client connected with a stale version.
pub const VERSION_MISMATCH: u16 = 4700;
/// The game shipped a new build while we were connected.
pub const VERSION_EXPIRED: u16 = 4710;
pub const AUTHENTICATION_FAILURE: u16 = 4800;

/// Codes after which reconnecting is pointless.
pub const NO_RECONNECT: [u16; 3] = [AUTHENTICATION_FAILURE, PLAYER_KICKED, VERSION_EXPIRED];

/// Codes that mean our sprites belong to an older build.
pub const VERSION_CHANGE: [u16; 2] = [VERSION_MISMATCH, VERSION_EXPIRED];

pub fn is_version_change(code: u16) -> bool {
    VERSION_CHANGE.contains(&code)
}

pub fn message(code: u16) -> String {
    let known = match code {
        RECONNECT_INITIATED => "Reconnect initiated",
        PLAYER_LEFT_VOLUNTARILY => "Player left voluntarily",
        USER_SESSION_SUPERSEDED => "User session superseded",
        CONNECTION_SUPERSEDED => "Connection superseded",
        SERVER_DISPOSED => "Server disposed",
        HEARTBEAT_EXPIRED => "Heartbeat expired",
        PLAYER_KICKED => "Player kicked",
        VERSION_MISMATCH => "Version mismatch",
        VERSION_EXPIRED => "Version expired",
        AUTHENTICATION_FAILURE => "Authentication failure",
        _ => return format!("Unknown close code: {}", code),
    };
    known.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_cover_known_and_unknown_codes() {
        assert_eq!(message(4700), "Version mismatch");
        assert_eq!(message(1006), "Unknown close code: 1006");
    }

    #[test]
    fn version_change_codes() {
        assert!(is_version_change(VERSION_MISMATCH));
        assert!(is_version_change(VERSION_EXPIRED));
        assert!(!is_version_change(HEARTBEAT_EXPIRED));
    }
}
