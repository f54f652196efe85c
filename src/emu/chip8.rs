use std::ops::Range;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{
    Chip8Config, Chip8Error, Color, CycleOutcome, DISPLAY_SIZE, DISPLAY_X, DISPLAY_Y, FONT,
    FONT_END_ADDRESS, FONT_START_ADDRESS, Framebuffer, Instruction, Opcode, Quirks,
};
use crate::debugger::{Debugger, Gate};
use crate::u4;

// Standard CHIP-8 memory layout
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;
pub const STACK_DEPTH: usize = 16;

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 pixels, each either the foreground or the background colour
    pub(crate) framebuffer: Framebuffer,
    pub(crate) foreground: Color,
    pub(crate) background: Color,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack for subroutine returns, valid in `[0, sp)`
    pub(crate) stack: [u16; STACK_DEPTH],
    pub(crate) sp: u8,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Keypad state, bit `k` set while key `k` is held
    pub(crate) keys_pressed: u16,
    /// Keypad state as last seen by FX0A
    pub(crate) keys_snapshot: u16,

    /// Raised by the scheduler, lets exactly one DXYN draw
    pub(crate) display_interrupt: bool,
    /// DXYN attempts since the last successful draw
    pub(crate) draw_requests: u8,

    pub(crate) quirks: Quirks,
    pub(crate) rng: StdRng,
}

impl Chip8 {
    pub fn new(config: &Chip8Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Like [`Chip8::new`] but with a reproducible CXNN sequence.
    pub fn with_seed(config: &Chip8Config, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &Chip8Config, rng: StdRng) -> Self {
        let mut chip8 = Chip8 {
            memory: [0; MEMORY_SIZE],
            framebuffer: [config.background; DISPLAY_SIZE],
            foreground: config.foreground,
            background: config.background,
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: [0; STACK_DEPTH],
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            keys_pressed: 0,
            keys_snapshot: 0,
            display_interrupt: false,
            draw_requests: 0,
            quirks: config.quirks,
            rng,
        };
        chip8.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        chip8
    }

    /// Copies a ROM image to 0x200 and points the program counter at it.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        let rom_end = ROM_START_ADDRESS + rom.len();
        self.memory
            .get_mut(ROM_START_ADDRESS..rom_end)
            .ok_or(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            })?
            .copy_from_slice(rom);

        self.pc = ROM_START_ADDRESS as u16;
        log::debug!("Loaded {} byte ROM at {:#05X}", rom.len(), ROM_START_ADDRESS);

        Ok(())
    }

    /// Reads the instruction at pc and advances pc past it.
    pub fn decode(&mut self) -> Result<Instruction, Chip8Error> {
        let high = *self.mem_get(self.pc)?;
        let low = *self.mem_get(self.pc.wrapping_add(1))?;
        self.pc = self.pc.wrapping_add(2);

        Ok(Instruction::from_bytes(high, low))
    }

    /// The instruction at pc, without side effects.
    pub fn peek(&self) -> Option<Opcode> {
        let pc = usize::from(self.pc);
        let high = *self.memory.get(pc)?;
        let low = *self.memory.get(pc + 1)?;
        Some(Opcode::decode(Instruction::from_bytes(high, low)))
    }

    /// Executes a single CPU cycle (fetch, decode, debugger check, execute).
    ///
    /// When the debugger holds the instruction back, pc is rewound so the same instruction
    /// is fetched again on the next cycle. A failed instruction also leaves pc on itself.
    pub fn cpu_cycle(&mut self, debugger: Option<&mut Debugger>) -> Result<CycleOutcome, Chip8Error> {
        let address = self.pc;
        let instruction = self.decode()?;
        let opcode = Opcode::decode(instruction);

        if let Some(debugger) = debugger {
            match debugger.before_instruction(address, opcode.mnemonic()) {
                Gate::Proceed => {}
                Gate::Halt => {
                    self.pc = address;
                    return Ok(CycleOutcome::Halted);
                }
                Gate::Quit => {
                    self.pc = address;
                    return Ok(CycleOutcome::Quit);
                }
            }
        }

        log::trace!("{address:03X}: {instruction} {opcode}");
        if let Err(e) = self.execute(opcode) {
            self.pc = address;
            return Err(e);
        }
        Ok(CycleOutcome::Executed)
    }

    /// Updates the delay and sound timers. Should be called at 60Hz.
    pub fn timers_cycle(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Lets the next DXYN draw once enough draw attempts have piled up.
    pub fn raise_display_interrupt(&mut self) {
        if self.draw_requests > 2 {
            self.display_interrupt = true;
        }
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        let mask = 1u16 << key.get();
        if pressed {
            self.keys_pressed |= mask;
        } else {
            self.keys_pressed &= !mask;
        }
    }

    pub fn toggle_key(&mut self, key: u4) {
        self.keys_pressed ^= 1u16 << key.get();
    }

    pub fn is_key_pressed(&self, key: u4) -> bool {
        self.keys_pressed & (1u16 << key.get()) != 0
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Colour of the pixel at column `x`, row `y`, or `None` off screen.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x < DISPLAY_X && y < DISPLAY_Y {
            Some(self.framebuffer[y * DISPLAY_X + x])
        } else {
            None
        }
    }

    pub fn is_pixel_lit(&self, x: usize, y: usize) -> bool {
        self.pixel(x, y) == Some(self.foreground)
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn set_index(&mut self, i: u16) {
        self.i = i;
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn set_register(&mut self, reg: u4, value: u8) {
        self.v[reg] = value;
    }

    /// Return addresses currently on the call stack, oldest first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..usize::from(self.sp)]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn keys_pressed(&self) -> u16 {
        self.keys_pressed
    }

    pub fn keys_snapshot(&self) -> u16 {
        self.keys_snapshot
    }

    pub fn display_interrupt(&self) -> bool {
        self.display_interrupt
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    /// Helper to get a mutable reference to a memory location with bounds checking.
    pub(crate) fn mem_get(&mut self, addr: u16) -> Result<&mut u8, Chip8Error> {
        self.memory
            .get_mut(addr as usize)
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    /// Index range of `len` bytes starting at `start`, if all of them are inside memory.
    ///
    /// Fails with the first address that is out of range.
    pub(crate) fn mem_range(&self, start: u16, len: usize) -> Result<Range<usize>, Chip8Error> {
        let start = usize::from(start);
        let end = start + len;
        if len == 0 || end <= MEMORY_SIZE {
            return Ok(start..end);
        }
        Err(Chip8Error::MemoryOutOfBounds {
            address: start.max(MEMORY_SIZE) as u16,
        })
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new(&Chip8Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_with_font_and_cleared_screen() {
        let config = Chip8Config {
            background: Color::BLUE,
            ..Chip8Config::default()
        };
        let chip8 = Chip8::with_seed(&config, 0);

        assert_eq!(&chip8.memory[FONT_START_ADDRESS..FONT_END_ADDRESS], &FONT[..]);
        assert!(chip8.framebuffer().iter().all(|&c| c == Color::BLUE));
        assert_eq!(chip8.pc(), 0x200);
        assert!(chip8.stack().is_empty());
    }

    #[test]
    fn loads_rom_at_program_start() {
        let mut chip8 = Chip8::default();
        chip8.load(&[0x12, 0x34, 0x56]).unwrap();
        assert_eq!(&chip8.memory[0x200..0x203], &[0x12, 0x34, 0x56]);
        assert_eq!(chip8.pc(), 0x200);
    }

    #[test]
    fn accepts_a_rom_that_fills_memory_exactly() {
        let mut chip8 = Chip8::default();
        chip8.load(&vec![0xAB; MAX_ROM_SIZE]).unwrap();
        assert_eq!(chip8.memory[MEMORY_SIZE - 1], 0xAB);
    }

    #[test]
    fn rejects_oversized_rom() {
        let mut chip8 = Chip8::default();
        let err = chip8.load(&vec![0; MAX_ROM_SIZE + 1]).unwrap_err();
        assert!(matches!(
            err,
            Chip8Error::RomTooLarge { size, max_size } if size == MAX_ROM_SIZE + 1 && max_size == MAX_ROM_SIZE
        ));
    }

    #[test]
    fn fetch_past_end_of_memory_fails() {
        let mut chip8 = Chip8::default();
        chip8.set_pc(0xFFF);
        assert!(matches!(
            chip8.decode(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        ));
    }

    #[test]
    fn keys_are_a_bitmask() {
        let mut chip8 = Chip8::default();
        chip8.set_key(u4::new(0xA), true);
        chip8.toggle_key(u4::new(0x1));
        assert_eq!(chip8.keys_pressed(), (1 << 0xA) | (1 << 0x1));
        chip8.set_key(u4::new(0xA), false);
        chip8.toggle_key(u4::new(0x1));
        assert_eq!(chip8.keys_pressed(), 0);
    }

    #[test]
    fn timers_count_down_to_zero() {
        let mut chip8 = Chip8::default();
        chip8.delay_timer = 2;
        chip8.sound_timer = 1;
        chip8.timers_cycle();
        assert_eq!((chip8.delay_timer(), chip8.sound_timer()), (1, 0));
        assert!(!chip8.should_beep());
        chip8.timers_cycle();
        chip8.timers_cycle();
        assert_eq!(chip8.delay_timer(), 0);
    }

    #[test]
    fn pixel_outside_the_screen_is_none() {
        let mut chip8 = Chip8::default();
        chip8.framebuffer[DISPLAY_SIZE - 1] = chip8.foreground;

        assert_eq!(chip8.pixel(DISPLAY_X - 1, DISPLAY_Y - 1), Some(chip8.foreground));
        assert!(chip8.is_pixel_lit(DISPLAY_X - 1, DISPLAY_Y - 1));
        assert_eq!(chip8.pixel(DISPLAY_X, 0), None);
        assert_eq!(chip8.pixel(0, DISPLAY_Y), None);
        assert!(!chip8.is_pixel_lit(usize::MAX, usize::MAX));
    }

    #[test]
    fn memory_range_reports_the_first_address_out_of_bounds() {
        let chip8 = Chip8::default();
        assert_eq!(chip8.mem_range(0xFFD, 3).unwrap(), 0xFFD..0x1000);
        assert!(matches!(
            chip8.mem_range(0xFFE, 3),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        ));
        assert!(matches!(
            chip8.mem_range(0x1234, 1),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1234 })
        ));
        assert!(chip8.mem_range(0xFFFF, 0).is_ok());
    }

    #[test]
    fn unknown_instruction_halts_while_stepping() {
        let mut chip8 = Chip8::default();
        chip8.load(&[0x01, 0x23, 0xFF, 0xFF, 0x60, 0x01]).unwrap();
        let mut debugger = Debugger::new();

        assert_eq!(chip8.cpu_cycle(Some(&mut debugger)).unwrap(), CycleOutcome::Halted);
        assert_eq!(chip8.pc(), 0x200);

        // One step crosses exactly one instruction, even one that does nothing
        debugger.step();
        assert_eq!(chip8.cpu_cycle(Some(&mut debugger)).unwrap(), CycleOutcome::Executed);
        assert_eq!(chip8.cpu_cycle(Some(&mut debugger)).unwrap(), CycleOutcome::Halted);
        assert_eq!(chip8.pc(), 0x202);

        debugger.step();
        assert_eq!(chip8.cpu_cycle(Some(&mut debugger)).unwrap(), CycleOutcome::Executed);
        assert_eq!(chip8.cpu_cycle(Some(&mut debugger)).unwrap(), CycleOutcome::Halted);
        assert_eq!(chip8.pc(), 0x204);
        assert_eq!(chip8.registers()[0], 0);
    }

    #[test]
    fn failed_instruction_leaves_pc_on_itself() {
        let mut chip8 = Chip8::default();
        // CALL 0x200 forever, then RET with nothing on the stack
        chip8.load(&[0x22, 0x00]).unwrap();
        for _ in 0..STACK_DEPTH {
            chip8.cpu_cycle(None).unwrap();
        }
        assert!(matches!(
            chip8.cpu_cycle(None),
            Err(Chip8Error::StackOverflow { .. })
        ));
        assert_eq!(chip8.pc(), 0x200);
        assert_eq!(chip8.stack().len(), STACK_DEPTH);

        let mut chip8 = Chip8::default();
        chip8.load(&[0x00, 0xEE]).unwrap();
        assert!(matches!(chip8.cpu_cycle(None), Err(Chip8Error::StackUnderflow)));
        assert_eq!(chip8.pc(), 0x200);
        assert!(matches!(chip8.cpu_cycle(None), Err(Chip8Error::StackUnderflow)));
    }

    proptest! {
        #[test]
        fn decode_splits_any_byte_pair(hi in any::<u8>(), lo in any::<u8>(), slot in 0u16..0x700) {
            let mut chip8 = Chip8::default();
            let pc = ROM_START_ADDRESS as u16 + slot * 2;
            chip8.memory[usize::from(pc)] = hi;
            chip8.memory[usize::from(pc) + 1] = lo;
            chip8.set_pc(pc);

            let ins = chip8.decode().unwrap();

            prop_assert_eq!(ins.opcode.get(), hi >> 4);
            prop_assert_eq!(ins.x.get(), hi & 0xF);
            prop_assert_eq!(ins.nn, lo);
            prop_assert_eq!(ins.y.get(), lo >> 4);
            prop_assert_eq!(ins.n.get(), lo & 0xF);
            prop_assert_eq!(ins.nnn, (u16::from(hi & 0xF) << 8) | u16::from(lo));
            prop_assert_eq!(chip8.pc(), pc + 2);
        }
    }
}
