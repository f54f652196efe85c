use std::fmt;
use std::str::FromStr;

use crate::u4;

/// The operand fields of one two-byte instruction.
///
/// Every byte pair yields a structurally valid `Instruction`; whether the pattern means
/// anything is decided later by [`Opcode::decode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Top nibble of the first byte, selects the instruction family.
    pub opcode: u4,
    pub x: u4,
    pub y: u4,
    pub n: u4,
    pub nn: u8,
    pub nnn: u16,
}

impl Instruction {
    pub fn from_bytes(high: u8, low: u8) -> Self {
        let x = u4::low(high);
        Self {
            opcode: u4::high(high),
            x,
            y: u4::high(low),
            n: u4::low(low),
            nn: low,
            nnn: (u16::from(x) << 8) | u16::from(low),
        }
    }

    pub fn raw(&self) -> u16 {
        (u16::from(self.opcode) << 12) | self.nnn
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.raw())
    }
}

/// CHIP-8 instruction opcodes.
///
/// The fields (x, y, n, nn, nnn) correspond to the operands encoded in the instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// 0nnn - Call machine code routine at nnn. Not supported, executes as a no-op.
    MachineCall { nnn: u16 },

    /// 1nnn - Jump to location nnn.
    Jump { nnn: u16 },
    /// Bnnn - Jump to location nnn + V0.
    JumpWithOffset { nnn: u16 },

    /// 2nnn - Call subroutine at nnn.
    Call { nnn: u16 },
    /// 00EE - Return from a subroutine.
    Return,

    /// 3xnn - Skip next instruction if Vx == nn.
    SkipRegEqualImm { x: u4, nn: u8 },
    /// 4xnn - Skip next instruction if Vx != nn.
    SkipRegNotEqualImm { x: u4, nn: u8 },
    /// 5xy0 - Skip next instruction if Vx == Vy.
    SkipRegEqualReg { x: u4, y: u4 },
    /// 9xy0 - Skip next instruction if Vx != Vy.
    SkipRegNotEqualReg { x: u4, y: u4 },

    /// 6xnn - Set Vx = nn.
    SetRegImm { x: u4, nn: u8 },
    /// 7xnn - Set Vx = Vx + nn.
    AddRegImm { x: u4, nn: u8 },
    /// Annn - Set I = nnn.
    SetIndexImm { nnn: u16 },
    /// Fx1E - Set I = I + Vx.
    AddIndexReg { x: u4 },

    /// 8xyN - ALU operations
    ALU { x: u4, y: u4, op: OpcodeALU },
    /// Cxnn - Set Vx = random byte AND nn.
    Random { x: u4, nn: u8 },

    /// 00E0 - Clear the display.
    ClearDisplay,
    /// Dxyn - Display sprite.
    Draw { x: u4, y: u4, n: u4 },

    /// Ex9E - Skip next instruction if key with the value of Vx is pressed.
    SkipIfPressed { x: u4 },
    /// ExA1 - Skip next instruction if key with the value of Vx is not pressed.
    SkipIfNotPressed { x: u4 },
    /// Fx0A - Wait for a key press, store the value of the key in Vx.
    WaitForKey { x: u4 },

    /// Fx07 - Set Vx = delay timer value.
    ReadDelayTimer { x: u4 },
    /// Fx15 - Set delay timer = Vx.
    SetDelayTimer { x: u4 },
    /// Fx18 - Set sound timer = Vx.
    SetSoundTimer { x: u4 },

    /// Fx29 - Set I = location of sprite for a hex digit.
    FontChar { x: u4 },
    /// Fx33 - Store BCD representation of Vx in memory locations I, I+1, and I+2.
    BCD { x: u4 },

    /// Fx55 - Store registers V0 through Vx in memory starting at location I.
    StoreRegs { x: u4 },
    /// Fx65 - Read registers V0 through Vx from memory starting at location I.
    LoadRegs { x: u4 },

    /// A pattern with no defined meaning.
    Unknown(Instruction),
}

/// ALU operations for the 8xyN instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpcodeALU {
    /// 8xy0 - Vx = Vy
    Set,
    /// 8xy1 - Vx = Vx OR Vy
    Or,
    /// 8xy2 - Vx = Vx AND Vy
    And,
    /// 8xy3 - Vx = Vx XOR Vy
    Xor,
    /// 8xy4 - Vx = Vx + Vy
    Add,
    /// 8xy5 - Vx = Vx - Vy
    Sub,
    /// 8xy6 - Vx = Vy SHR 1
    ShiftRight,
    /// 8xy7 - Vx = Vy - Vx
    SubReverse,
    /// 8xyE - Vx = Vy SHL 1
    ShiftLeft,
}

impl Opcode {
    /// Maps a decoded instruction onto its operation.
    pub fn decode(instruction: Instruction) -> Self {
        let Instruction {
            opcode,
            x,
            y,
            n,
            nn,
            nnn,
        } = instruction;

        match (opcode.get(), x.get(), y.get(), n.get()) {
            (0x0, 0x0, 0xE, 0x0) => Opcode::ClearDisplay,
            (0x0, 0x0, 0xE, 0xE) => Opcode::Return,
            (0x0, _, _, _) => Opcode::MachineCall { nnn },
            (0x1, _, _, _) => Opcode::Jump { nnn },
            (0x2, _, _, _) => Opcode::Call { nnn },
            (0x3, _, _, _) => Opcode::SkipRegEqualImm { x, nn },
            (0x4, _, _, _) => Opcode::SkipRegNotEqualImm { x, nn },
            (0x5, _, _, 0x0) => Opcode::SkipRegEqualReg { x, y },
            (0x6, _, _, _) => Opcode::SetRegImm { x, nn },
            (0x7, _, _, _) => Opcode::AddRegImm { x, nn },
            (0x8, _, _, _) => Opcode::ALU {
                x,
                y,
                op: match n.get() {
                    0x0 => OpcodeALU::Set,
                    0x1 => OpcodeALU::Or,
                    0x2 => OpcodeALU::And,
                    0x3 => OpcodeALU::Xor,
                    0x4 => OpcodeALU::Add,
                    0x5 => OpcodeALU::Sub,
                    0x6 => OpcodeALU::ShiftRight,
                    0x7 => OpcodeALU::SubReverse,
                    0xE => OpcodeALU::ShiftLeft,
                    _ => return Opcode::Unknown(instruction),
                },
            },
            (0x9, _, _, 0x0) => Opcode::SkipRegNotEqualReg { x, y },
            (0xA, _, _, _) => Opcode::SetIndexImm { nnn },
            (0xB, _, _, _) => Opcode::JumpWithOffset { nnn },
            (0xC, _, _, _) => Opcode::Random { x, nn },
            (0xD, _, _, _) => Opcode::Draw { x, y, n },
            (0xE, _, 0x9, 0xE) => Opcode::SkipIfPressed { x },
            (0xE, _, 0xA, 0x1) => Opcode::SkipIfNotPressed { x },
            (0xF, _, 0x0, 0x7) => Opcode::ReadDelayTimer { x },
            (0xF, _, 0x0, 0xA) => Opcode::WaitForKey { x },
            (0xF, _, 0x1, 0x5) => Opcode::SetDelayTimer { x },
            (0xF, _, 0x1, 0x8) => Opcode::SetSoundTimer { x },
            (0xF, _, 0x1, 0xE) => Opcode::AddIndexReg { x },
            (0xF, _, 0x2, 0x9) => Opcode::FontChar { x },
            (0xF, _, 0x3, 0x3) => Opcode::BCD { x },
            (0xF, _, 0x5, 0x5) => Opcode::StoreRegs { x },
            (0xF, _, 0x6, 0x5) => Opcode::LoadRegs { x },

            _ => Opcode::Unknown(instruction),
        }
    }

    /// The breakpoint key of this operation. Machine calls and unknown patterns have none.
    pub fn mnemonic(&self) -> Option<Mnemonic> {
        let mnemonic = match self {
            Opcode::MachineCall { .. } | Opcode::Unknown(_) => return None,
            Opcode::ClearDisplay => Mnemonic::ClearDisplay,
            Opcode::Return => Mnemonic::Return,
            Opcode::Jump { .. } => Mnemonic::Jump,
            Opcode::Call { .. } => Mnemonic::Call,
            Opcode::SkipRegEqualImm { .. } => Mnemonic::SkipRegEqualImm,
            Opcode::SkipRegNotEqualImm { .. } => Mnemonic::SkipRegNotEqualImm,
            Opcode::SkipRegEqualReg { .. } => Mnemonic::SkipRegEqualReg,
            Opcode::SetRegImm { .. } => Mnemonic::SetRegImm,
            Opcode::AddRegImm { .. } => Mnemonic::AddRegImm,
            Opcode::ALU { op, .. } => match op {
                OpcodeALU::Set => Mnemonic::AluSet,
                OpcodeALU::Or => Mnemonic::AluOr,
                OpcodeALU::And => Mnemonic::AluAnd,
                OpcodeALU::Xor => Mnemonic::AluXor,
                OpcodeALU::Add => Mnemonic::AluAdd,
                OpcodeALU::Sub => Mnemonic::AluSub,
                OpcodeALU::ShiftRight => Mnemonic::AluShiftRight,
                OpcodeALU::SubReverse => Mnemonic::AluSubReverse,
                OpcodeALU::ShiftLeft => Mnemonic::AluShiftLeft,
            },
            Opcode::SkipRegNotEqualReg { .. } => Mnemonic::SkipRegNotEqualReg,
            Opcode::SetIndexImm { .. } => Mnemonic::SetIndexImm,
            Opcode::JumpWithOffset { .. } => Mnemonic::JumpWithOffset,
            Opcode::Random { .. } => Mnemonic::Random,
            Opcode::Draw { .. } => Mnemonic::Draw,
            Opcode::SkipIfPressed { .. } => Mnemonic::SkipIfPressed,
            Opcode::SkipIfNotPressed { .. } => Mnemonic::SkipIfNotPressed,
            Opcode::ReadDelayTimer { .. } => Mnemonic::ReadDelayTimer,
            Opcode::SetDelayTimer { .. } => Mnemonic::SetDelayTimer,
            Opcode::SetSoundTimer { .. } => Mnemonic::SetSoundTimer,
            Opcode::AddIndexReg { .. } => Mnemonic::AddIndexReg,
            Opcode::WaitForKey { .. } => Mnemonic::WaitForKey,
            Opcode::FontChar { .. } => Mnemonic::FontChar,
            Opcode::BCD { .. } => Mnemonic::BCD,
            Opcode::StoreRegs { .. } => Mnemonic::StoreRegs,
            Opcode::LoadRegs { .. } => Mnemonic::LoadRegs,
        };
        Some(mnemonic)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Opcode::MachineCall { nnn } => write!(f, "SYS {nnn:#05X}"),
            Opcode::Jump { nnn } => write!(f, "JP {nnn:#05X}"),
            Opcode::JumpWithOffset { nnn } => write!(f, "JP V0, {nnn:#05X}"),
            Opcode::Call { nnn } => write!(f, "CALL {nnn:#05X}"),
            Opcode::Return => write!(f, "RET"),
            Opcode::SkipRegEqualImm { x, nn } => write!(f, "SE V{x}, {nn:#04X}"),
            Opcode::SkipRegNotEqualImm { x, nn } => write!(f, "SNE V{x}, {nn:#04X}"),
            Opcode::SkipRegEqualReg { x, y } => write!(f, "SE V{x}, V{y}"),
            Opcode::SkipRegNotEqualReg { x, y } => write!(f, "SNE V{x}, V{y}"),
            Opcode::SetRegImm { x, nn } => write!(f, "LD V{x}, {nn:#04X}"),
            Opcode::AddRegImm { x, nn } => write!(f, "ADD V{x}, {nn:#04X}"),
            Opcode::SetIndexImm { nnn } => write!(f, "LD I, {nnn:#05X}"),
            Opcode::AddIndexReg { x } => write!(f, "ADD I, V{x}"),
            Opcode::ALU { x, y, op } => {
                let name = match op {
                    OpcodeALU::Set => "LD",
                    OpcodeALU::Or => "OR",
                    OpcodeALU::And => "AND",
                    OpcodeALU::Xor => "XOR",
                    OpcodeALU::Add => "ADD",
                    OpcodeALU::Sub => "SUB",
                    OpcodeALU::ShiftRight => "SHR",
                    OpcodeALU::SubReverse => "SUBN",
                    OpcodeALU::ShiftLeft => "SHL",
                };
                write!(f, "{name} V{x}, V{y}")
            }
            Opcode::Random { x, nn } => write!(f, "RND V{x}, {nn:#04X}"),
            Opcode::ClearDisplay => write!(f, "CLS"),
            Opcode::Draw { x, y, n } => write!(f, "DRW V{x}, V{y}, {n}"),
            Opcode::SkipIfPressed { x } => write!(f, "SKP V{x}"),
            Opcode::SkipIfNotPressed { x } => write!(f, "SKNP V{x}"),
            Opcode::WaitForKey { x } => write!(f, "LD V{x}, K"),
            Opcode::ReadDelayTimer { x } => write!(f, "LD V{x}, DT"),
            Opcode::SetDelayTimer { x } => write!(f, "LD DT, V{x}"),
            Opcode::SetSoundTimer { x } => write!(f, "LD ST, V{x}"),
            Opcode::FontChar { x } => write!(f, "LD F, V{x}"),
            Opcode::BCD { x } => write!(f, "LD B, V{x}"),
            Opcode::StoreRegs { x } => write!(f, "LD [I], V{x}"),
            Opcode::LoadRegs { x } => write!(f, "LD V{x}, [I]"),
            Opcode::Unknown(instruction) => write!(f, "??? {instruction}"),
        }
    }
}

/// The 34 instruction patterns a breakpoint can be placed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mnemonic {
    ClearDisplay,
    Return,
    Jump,
    Call,
    SkipRegEqualImm,
    SkipRegNotEqualImm,
    SkipRegEqualReg,
    SetRegImm,
    AddRegImm,
    AluSet,
    AluOr,
    AluAnd,
    AluXor,
    AluAdd,
    AluSub,
    AluShiftRight,
    AluSubReverse,
    AluShiftLeft,
    SkipRegNotEqualReg,
    SetIndexImm,
    JumpWithOffset,
    Random,
    Draw,
    SkipIfPressed,
    SkipIfNotPressed,
    ReadDelayTimer,
    SetDelayTimer,
    SetSoundTimer,
    AddIndexReg,
    WaitForKey,
    FontChar,
    BCD,
    StoreRegs,
    LoadRegs,
}

impl Mnemonic {
    /// Table order, also used for the 1-based numbers accepted by the debugger.
    pub const ALL: [Mnemonic; 34] = [
        Mnemonic::ClearDisplay,
        Mnemonic::Return,
        Mnemonic::Jump,
        Mnemonic::Call,
        Mnemonic::SkipRegEqualImm,
        Mnemonic::SkipRegNotEqualImm,
        Mnemonic::SkipRegEqualReg,
        Mnemonic::SetRegImm,
        Mnemonic::AddRegImm,
        Mnemonic::AluSet,
        Mnemonic::AluOr,
        Mnemonic::AluAnd,
        Mnemonic::AluXor,
        Mnemonic::AluAdd,
        Mnemonic::AluSub,
        Mnemonic::AluShiftRight,
        Mnemonic::AluSubReverse,
        Mnemonic::AluShiftLeft,
        Mnemonic::SkipRegNotEqualReg,
        Mnemonic::SetIndexImm,
        Mnemonic::JumpWithOffset,
        Mnemonic::Random,
        Mnemonic::Draw,
        Mnemonic::SkipIfPressed,
        Mnemonic::SkipIfNotPressed,
        Mnemonic::ReadDelayTimer,
        Mnemonic::SetDelayTimer,
        Mnemonic::SetSoundTimer,
        Mnemonic::AddIndexReg,
        Mnemonic::WaitForKey,
        Mnemonic::FontChar,
        Mnemonic::BCD,
        Mnemonic::StoreRegs,
        Mnemonic::LoadRegs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mnemonic::ClearDisplay => "00E0",
            Mnemonic::Return => "00EE",
            Mnemonic::Jump => "1NNN",
            Mnemonic::Call => "2NNN",
            Mnemonic::SkipRegEqualImm => "3XNN",
            Mnemonic::SkipRegNotEqualImm => "4XNN",
            Mnemonic::SkipRegEqualReg => "5XY0",
            Mnemonic::SetRegImm => "6XNN",
            Mnemonic::AddRegImm => "7XNN",
            Mnemonic::AluSet => "8XY0",
            Mnemonic::AluOr => "8XY1",
            Mnemonic::AluAnd => "8XY2",
            Mnemonic::AluXor => "8XY3",
            Mnemonic::AluAdd => "8XY4",
            Mnemonic::AluSub => "8XY5",
            Mnemonic::AluShiftRight => "8XY6",
            Mnemonic::AluSubReverse => "8XY7",
            Mnemonic::AluShiftLeft => "8XYE",
            Mnemonic::SkipRegNotEqualReg => "9XY0",
            Mnemonic::SetIndexImm => "ANNN",
            Mnemonic::JumpWithOffset => "BNNN",
            Mnemonic::Random => "CXNN",
            Mnemonic::Draw => "DXYN",
            Mnemonic::SkipIfPressed => "EX9E",
            Mnemonic::SkipIfNotPressed => "EXA1",
            Mnemonic::ReadDelayTimer => "FX07",
            Mnemonic::SetDelayTimer => "FX15",
            Mnemonic::SetSoundTimer => "FX18",
            Mnemonic::AddIndexReg => "FX1E",
            Mnemonic::WaitForKey => "FX0A",
            Mnemonic::FontChar => "FX29",
            Mnemonic::BCD => "FX33",
            Mnemonic::StoreRegs => "FX55",
            Mnemonic::LoadRegs => "FX65",
        }
    }

    /// Short human description, shown next to the mnemonic in listings.
    pub fn description(self) -> &'static str {
        match self {
            Mnemonic::ClearDisplay => "Clear",
            Mnemonic::Return => "Return",
            Mnemonic::Jump => "Jump",
            Mnemonic::Call => "Subroutine",
            Mnemonic::SkipRegEqualImm => "Skip if Vx == NN",
            Mnemonic::SkipRegNotEqualImm => "Skip if Vx != NN",
            Mnemonic::SkipRegEqualReg => "Skip if Vx == Vy",
            Mnemonic::SetRegImm => "Set Vx = NN",
            Mnemonic::AddRegImm => "Add NN to Vx",
            Mnemonic::AluSet => "Set Vx = Vy",
            Mnemonic::AluOr => "Binary OR",
            Mnemonic::AluAnd => "Binary AND",
            Mnemonic::AluXor => "Logical XOR",
            Mnemonic::AluAdd => "Add Vy to Vx",
            Mnemonic::AluSub => "Vx - Vy",
            Mnemonic::AluShiftRight => "Shift right",
            Mnemonic::AluSubReverse => "Vy - Vx",
            Mnemonic::AluShiftLeft => "Shift left",
            Mnemonic::SkipRegNotEqualReg => "Skip if Vx != Vy",
            Mnemonic::SetIndexImm => "Set index",
            Mnemonic::JumpWithOffset => "Jump with offset",
            Mnemonic::Random => "Random",
            Mnemonic::Draw => "Display",
            Mnemonic::SkipIfPressed => "Skip if key",
            Mnemonic::SkipIfNotPressed => "Skip if not key",
            Mnemonic::ReadDelayTimer => "Vx = delay",
            Mnemonic::SetDelayTimer => "Set delay",
            Mnemonic::SetSoundTimer => "Set sound",
            Mnemonic::AddIndexReg => "Index + Vx",
            Mnemonic::WaitForKey => "Get key",
            Mnemonic::FontChar => "Font char",
            Mnemonic::BCD => "Decimal",
            Mnemonic::StoreRegs => "Store",
            Mnemonic::LoadRegs => "Load",
        }
    }

    /// 1-based position in [`Mnemonic::ALL`].
    pub fn number(self) -> usize {
        self as usize + 1
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown instruction mnemonic: '{0}'")]
pub struct UnknownMnemonic(pub String);

impl FromStr for Mnemonic {
    type Err = UnknownMnemonic;

    /// Accepts the exact table spelling (`8XY4`) or the 1-based table number (`14`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(mnemonic) = Mnemonic::ALL.iter().find(|m| m.as_str() == s) {
            return Ok(*mnemonic);
        }

        s.parse::<usize>()
            .ok()
            .and_then(|number| number.checked_sub(1))
            .and_then(|slot| Mnemonic::ALL.get(slot).copied())
            .ok_or_else(|| UnknownMnemonic(s.to_string()))
    }
}
