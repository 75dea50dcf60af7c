/// Discord gateway opcode for a voice state update (join, move, leave).
pub const OP_VOICE_STATE_UPDATE: u8 = 4;

/// Duration of one opus frame sent over a voice connection.
pub const FRAME_DURATION_MS: u64 = 20;

/// An opus frame of silence.
pub const SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];
