use rand::Rng;

use super::{
    Chip8, Chip8Error, DISPLAY_X, DISPLAY_Y, FONT_START_ADDRESS, GLYPH_SIZE, Opcode, OpcodeALU,
    STACK_DEPTH,
};
use crate::u4;

/// Highest addressable byte; FX1E flags an index past it.
const MAX_ADDRESS: u16 = 0x0FFF;
/// FX1E only reports overflow above this index.
const INDEX_OVERFLOW_GUARD: u16 = 1000;

impl Chip8 {
    /// Runs one decoded operation. pc must already point past the instruction.
    pub fn execute(&mut self, opcode: Opcode) -> Result<(), Chip8Error> {
        match opcode {
            Opcode::MachineCall { nnn } => {
                log::debug!("Skipping machine code routine call to {nnn:#05X}");
            }
            Opcode::ClearDisplay => {
                self.framebuffer.fill(self.background);
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                let slot = usize::from(self.sp);
                if slot >= STACK_DEPTH {
                    return Err(Chip8Error::StackOverflow {
                        pc: self.pc.wrapping_sub(2),
                        depth: STACK_DEPTH,
                    });
                }
                self.stack[slot] = self.pc;
                self.sp += 1;
                self.pc = nnn;
            }
            Opcode::Return => {
                self.sp = self.sp.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
                let slot = usize::from(self.sp);
                self.pc = self.stack[slot];
                self.stack[slot] = 0;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    self.skip();
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    self.skip();
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.skip();
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.skip();
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
                if self.i > MAX_ADDRESS && self.i > INDEX_OVERFLOW_GUARD {
                    self.v[0xF] = 1;
                }
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n)?;
            }
            Opcode::SkipIfPressed { x } => {
                if self.is_key_value_pressed(self.v[x]) {
                    self.skip();
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.is_key_value_pressed(self.v[x]) {
                    self.skip();
                }
            }
            Opcode::WaitForKey { x } => {
                self.execute_wait_for_key(x);
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                let digit = if self.quirks.font_index_from_operand {
                    x.get() >> 4
                } else {
                    self.v[x] & 0x0F
                };
                self.i = (FONT_START_ADDRESS + usize::from(digit) * GLYPH_SIZE) as u16;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                let range = self.mem_range(self.i, 3)?;
                self.memory[range].copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                let range = self.mem_range(self.i, count)?;
                self.memory[range].copy_from_slice(&self.v[..count]);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let range = self.mem_range(self.i, count)?;
                self.v[..count].copy_from_slice(&self.memory[range]);
                self.i = self.i.wrapping_add(count as u16);
            }
            Opcode::Unknown(instruction) => {
                log::warn!(
                    "Skipping undefined instruction {instruction} at {:#05X}",
                    self.pc.wrapping_sub(2)
                );
            }
        };

        Ok(())
    }

    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    fn is_key_value_pressed(&self, key: u8) -> bool {
        self.keys_pressed
            .checked_shr(key.into())
            .is_some_and(|bits| bits & 1 == 1)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => self.v[x] = self.v[y],
            OpcodeALU::Or => {
                self.v[x] |= self.v[y];
                self.v[0xF] = 0;
            }
            OpcodeALU::And => {
                self.v[x] &= self.v[y];
                self.v[0xF] = 0;
            }
            OpcodeALU::Xor => {
                self.v[x] ^= self.v[y];
                self.v[0xF] = 0;
            }
            OpcodeALU::Add => {
                let (res, overflow) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = if overflow { 1 } else { 0 };
            }
            OpcodeALU::Sub => {
                let (res, borrow) = self.v[x].overflowing_sub(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = if borrow { 0 } else { 1 }; // Notice that borrow is inverted
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = self.v[y].overflowing_sub(self.v[x]);
                self.v[x] = res;
                self.v[0xF] = if borrow { 0 } else { 1 };
            }
            OpcodeALU::ShiftRight => {
                let lsb = self.v[y] & 1;
                self.v[x] = self.v[y] >> 1;
                self.v[0xF] = lsb;
            }
            OpcodeALU::ShiftLeft => {
                let msb = (self.v[y] >> 7) & 1;
                self.v[x] = self.v[y] << 1;
                self.v[0xF] = msb;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<(), Chip8Error> {
        if !self.display_interrupt {
            // Retry until the scheduler lets a draw through
            self.draw_requests = self.draw_requests.saturating_add(1);
            self.pc = self.pc.wrapping_sub(2);
            return Ok(());
        }

        let x_pos = self.v[x] as usize % DISPLAY_X;
        let y_pos = self.v[y] as usize % DISPLAY_Y;

        // Don't draw out of bounds
        let row_count = std::cmp::min(usize::from(n), DISPLAY_Y - y_pos);
        let col_count = std::cmp::min(8, DISPLAY_X - x_pos);

        let sprite = self.mem_range(self.i, row_count)?;
        self.display_interrupt = false;
        self.draw_requests = 0;

        let mut any_erased = false;
        for row in 0..row_count {
            let sprite_byte = self.memory[sprite.start + row];

            for col in 0..col_count {
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let pixel = &mut self.framebuffer[(y_pos + row) * DISPLAY_X + x_pos + col];

                    if *pixel == self.foreground {
                        *pixel = self.background;
                        any_erased = true;
                    } else {
                        *pixel = self.foreground;
                    }
                }
            }
        }

        self.v[0xF] = if any_erased { 1 } else { 0 };
        Ok(())
    }

    fn execute_wait_for_key(&mut self, x: u4) {
        let mut pressed = None;

        if self.keys_pressed != self.keys_snapshot {
            let rising = self.keys_pressed & !self.keys_snapshot;
            if rising != 0 {
                pressed = Some(rising.trailing_zeros() as u8);
            }
            self.keys_snapshot = self.keys_pressed;
        }

        match pressed {
            Some(key) => {
                self.v[x] = key;
                self.keys_snapshot = 0;
            }
            // Repeat this instruction until a key goes down
            None => self.pc = self.pc.wrapping_sub(2),
        }
    }
}
