//! The context object owned by the control loop: active configuration, fault state, and per-tick MIDI emission.
//!
//! Whatever the performer should see in their terminal (saved text, hexdumps, parse errors) is written to a
//! [`core::fmt::Write`] console passed in by the caller.

use crate::{
    Error,
    configuration::{Config, DEFAULT_CONFIG, Destination, MAX_MAPPINGS, PITCH_BEND_MAX, Parsed},
    midi::{MidiOut, NOTE_VELOCITY, control_change, note_off, note_on, pitch_bend},
    persistence::{ConfigText, SaveSlot, Storage},
    sensor::{Button, SensorState},
};
use core::fmt::Write;
use embassy_time::Instant;

/// Line which prints the saved configuration instead of being parsed.
const DUMP_COMMAND: &str = "dump";

/// Line which prints a hexdump of the start of the save region instead of being parsed.
const HEXDUMP_COMMAND: &str = "hdmp";

/// How much of the save region `hdmp` shows.
const HEXDUMP_LEN: usize = 576;

/// Marks the last line of a configuration.
const TERMINATOR: &str = "END.";

/// Outcome of [`Engine::reconfigure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reconfigured {
    /// The new configuration was adopted and saved.
    Updated,
    /// The new configuration was rejected; the saved one is active again.
    RevertedToSaved,
    /// The new configuration was rejected and nothing usable is saved; the default is active.
    RevertedToDefault,
}

/// What happened during an [`Engine::tick`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tick {
    /// A new note started sounding.
    pub note_triggered: bool,
}

/// A sounding note, and the channel it has to be released on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlayingNote {
    channel: u8,
    note: u8,
}

/// Owns the active [`Config`] and the state the control loop carries between ticks.
///
/// The fault flag is sticky: anything that goes wrong raises it, and only a successful [`reconfigure`] clears it.
///
/// [`reconfigure`]: Engine::reconfigure
pub struct Engine {
    config: Config,
    fault: bool,
    pending: ConfigText,
    playing: Option<PlayingNote>,
    last_note_at: Option<Instant>,
    last_values: [Option<u16>; MAX_MAPPINGS],
}

impl Engine {
    /// Starts with the saved configuration, or with [`DEFAULT_CONFIG`] if nothing usable is saved.
    pub fn boot<S: Storage>(slot: &mut SaveSlot<S>) -> Self {
        let mut engine = Self {
            config: default_config(),
            fault: false,
            pending: ConfigText::new(),
            playing: None,
            last_note_at: None,
            last_values: [None; MAX_MAPPINGS],
        };

        if !slot.is_valid() {
            info!("No saved configuration; using the default");
            return engine;
        }

        match slot.read().and_then(|text| Config::parse(&text)) {
            Ok(Parsed { config, warning }) => {
                info!("Loaded saved configuration");
                engine.fault = warning.is_some();
                engine.adopt(config);
            }
            Err(_) => {
                error!("Saved configuration is unusable; using the default");
                engine.fault = true;
            }
        }
        engine
    }

    /// Getter.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` if something has gone wrong since the last successful reconfiguration.
    pub fn has_fault(&self) -> bool {
        self.fault
    }

    /// Raises the fault flag, e.g. because the sensor stopped responding.
    pub fn raise_fault(&mut self) {
        self.fault = true;
    }

    /// Handles one line from the console.
    ///
    /// Lines are collected until one contains `END.`, at which point the collected text is handed to
    /// [`reconfigure`](Engine::reconfigure). Between configurations, a `dump` line prints the saved text to `console`
    /// and an `hdmp` line prints the raw start of the save region.
    pub fn receive_line<S: Storage, W: Write>(
        &mut self,
        line: &str,
        slot: &mut SaveSlot<S>,
        console: &mut W,
    ) -> Option<Reconfigured> {
        trace!("Read line '{}'", line);

        if self.pending.is_empty() {
            if line.starts_with(DUMP_COMMAND) {
                let _ = match slot.read() {
                    Ok(text) => writeln!(console, "Saved config:\n{}\n---", text.as_str()),
                    Err(_) => writeln!(console, "No config saved"),
                };
                return None;
            }
            if line.starts_with(HEXDUMP_COMMAND) {
                if hexdump(slot, console).is_err() {
                    let _ = writeln!(console, "Unable to read flash");
                }
                return None;
            }
        }

        if self.pending.push_str(line).is_err() {
            return self.discard_pending();
        }

        if !line.contains(TERMINATOR) {
            if self.pending.push('\n').is_err() {
                return self.discard_pending();
            }
            return None;
        }

        let text = core::mem::take(&mut self.pending);
        Some(self.reconfigure(&text, slot, console))
    }

    fn discard_pending(&mut self) -> Option<Reconfigured> {
        error!("Configuration longer than {} bytes; discarding it", self.pending.capacity());
        self.pending.clear();
        self.fault = true;
        None
    }

    /// Replaces the active configuration with `text` and saves it.
    ///
    /// If `text` doesn't parse, the saved configuration becomes active again, or the default if nothing usable is
    /// saved. The fault flag is cleared on success, unless the text needed clamping or couldn't be saved.
    ///
    /// Problems are reported on `console`, naming the offending token and its position.
    pub fn reconfigure<S: Storage, W: Write>(
        &mut self,
        text: &str,
        slot: &mut SaveSlot<S>,
        console: &mut W,
    ) -> Reconfigured {
        match Config::parse(text) {
            Ok(Parsed { config, warning }) => {
                self.adopt(config);
                self.fault = warning.is_some();
                if let Some(warning) = warning {
                    let _ = writeln!(console, "Warning: {}", Diagnostic { error: warning, text });
                }
                if let Err(e) = slot.write(text) {
                    self.fault = true;
                    let _ = writeln!(console, "Unable to save config: {}", e);
                }
                info!("Updated config");
                let _ = writeln!(console, "Updated config");
                Reconfigured::Updated
            }
            Err(error) => {
                self.fault = true;
                let _ = writeln!(console, "Error: {}", Diagnostic { error, text });

                let saved = if slot.is_valid() {
                    slot.read().and_then(|text| Config::parse(&text)).ok()
                } else {
                    None
                };

                match saved {
                    Some(Parsed { config, .. }) => {
                        warn!("Reverting to saved config");
                        let _ = writeln!(console, "Reverting to saved config");
                        self.adopt(config);
                        Reconfigured::RevertedToSaved
                    }
                    None => {
                        warn!("Reverting to default config");
                        let _ = writeln!(console, "Reverting to default config");
                        self.adopt(default_config());
                        Reconfigured::RevertedToDefault
                    }
                }
            }
        }
    }

    fn adopt(&mut self, config: Config) {
        self.config = config;
        self.last_values = [None; MAX_MAPPINGS];
    }

    /// Turns the latest sensor sample into MIDI.
    ///
    /// When note mode is enabled, pressing Z plays the currently selected note. Holding C and Z auto-repeats: the
    /// selected note is played whenever it has changed and at least the auto-repeat interval has passed. Releasing Z
    /// stops the note. A note stays tracked until its Note Off is actually sent.
    ///
    /// Every other mapping sends its value whenever it differs from the value last sent. If the transmitter fails,
    /// the value is sent again on the next tick.
    pub fn tick<M: MidiOut>(&mut self, now: Instant, sensor: &SensorState, midi: &mut M) -> Result<Tick, M::Error> {
        let reading = sensor.current();
        let channel = self.config.channel();
        let mut tick = Tick::default();

        if self.config.notes_enabled() {
            if let Ok(note) = self.config.mapped_note(reading) {
                let auto_repeat = sensor.is_held(Button::C)
                    && sensor.is_held(Button::Z)
                    && self
                        .last_note_at
                        .is_none_or(|at| now.saturating_duration_since(at) >= self.config.auto_repeat())
                    && self.playing.map(|playing| playing.note) != Some(note);

                if sensor.was_pressed(Button::Z) || auto_repeat {
                    if let Some(playing) = self.playing {
                        midi.send(&note_off(playing.channel, playing.note))?;
                        self.playing = None;
                    }
                    midi.send(&note_on(channel, note, NOTE_VELOCITY))?;
                    self.playing = Some(PlayingNote { channel, note });
                    self.last_note_at = Some(now);
                    tick.note_triggered = true;
                }
            }
        }

        if !sensor.is_held(Button::Z) {
            if let Some(playing) = self.playing {
                midi.send(&note_off(playing.channel, playing.note))?;
                self.playing = None;
            }
        }

        for (index, mapping) in self.config.mappings().iter().enumerate() {
            let value = mapping.value(reading);
            if self.last_values[index] == Some(value) {
                continue;
            }

            match mapping.destination() {
                Destination::ControlChange(controller) => {
                    let value = u8::try_from(value.min(127)).unwrap_or(127);
                    midi.send(&control_change(channel, controller, value))?;
                }
                Destination::PitchBend => midi.send(&pitch_bend(channel, value.min(PITCH_BEND_MAX)))?,
                Destination::Note => {}
            }
            self.last_values[index] = Some(value);
        }

        Ok(tick)
    }

    /// Sends Note Off for every note on the active channel, releasing anything a previous run left sounding.
    pub fn silence<M: MidiOut>(&mut self, midi: &mut M) -> Result<(), M::Error> {
        let channel = self.config.channel();
        for note in 1..120 {
            midi.send(&note_off(channel, note))?;
        }
        self.playing = None;
        Ok(())
    }
}

fn default_config() -> Config {
    Config::parse(DEFAULT_CONFIG)
        .map(|parsed| parsed.config)
        .unwrap_or_default()
}

/// A parse error together with the text it points into.
struct Diagnostic<'a> {
    error: Error,
    text: &'a str,
}

impl core::fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.error)?;
        let Some(position) = self.error.position() else {
            return Ok(());
        };
        match self.text.get(position..).and_then(|rest| rest.split_ascii_whitespace().next()) {
            Some(token) => write!(f, " ('{token}')"),
            None => f.write_str(" (end of text)"),
        }
    }
}

/// Prints the start of the save region, 16 bytes per row, with printable ASCII alongside.
fn hexdump<S: Storage, W: Write>(slot: &mut SaveSlot<S>, console: &mut W) -> crate::Result<()> {
    const ROW: usize = 16;
    let length = HEXDUMP_LEN.min(slot.storage().geometry().capacity);
    let mut buffer = [0; ROW];

    for address in (0..length).step_by(ROW) {
        let row = &mut buffer[..ROW.min(length - address)];
        slot.read_raw(address, row)?;

        let _ = write!(console, "{address:08x}:");
        for pair in row.chunks(2) {
            let _ = console.write_char(' ');
            for byte in pair {
                let _ = write!(console, "{byte:02x}");
            }
        }
        let _ = console.write_str("  ");
        for &byte in row.iter() {
            let printable = if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' };
            let _ = console.write_char(printable);
        }
        let _ = console.write_char('\n');
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configuration::Key,
        midi::Recorder,
        persistence::mem::MemStorage,
        sensor::SensorReading,
    };
    use embassy_time::Duration;

    type Slot = SaveSlot<MemStorage<8192>>;
    type Console = heapless::String<4096>;

    fn slot() -> Slot {
        SaveSlot::new(MemStorage::new(1024, 256)).unwrap()
    }

    fn engine(text: &str) -> (Engine, Slot) {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);
        assert_eq!(Reconfigured::Updated, engine.reconfigure(text, &mut slot, &mut Console::new()));
        (engine, slot)
    }

    fn feed(engine: &mut Engine, slot: &mut Slot, lines: &[&str]) -> Option<Reconfigured> {
        let mut console = Console::new();
        lines
            .iter()
            .fold(None, |_, line| engine.receive_line(line, slot, &mut console))
    }

    #[test]
    fn boots_with_default() {
        let mut slot = slot();
        let engine = Engine::boot(&mut slot);
        assert_eq!(6, engine.config().mappings().len());
        assert!(!engine.has_fault());
    }

    #[test]
    fn boots_with_saved() {
        let mut slot = slot();
        slot.write("CHAN 7 ROOT A END.").unwrap();
        let engine = Engine::boot(&mut slot);
        assert_eq!(7, engine.config().channel());
        assert_eq!(Key::A, engine.config().root_key());
        assert!(!engine.has_fault());
    }

    #[test]
    fn boots_with_default_when_saved_text_is_broken() {
        let mut slot = slot();
        slot.write("CHAN seven").unwrap();
        let engine = Engine::boot(&mut slot);
        assert_eq!(6, engine.config().mappings().len());
        assert!(engine.has_fault());
    }

    #[test]
    fn lines_are_collected_until_terminator() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);

        assert_eq!(None, engine.receive_line("CHAN 2", &mut slot, &mut Console::new()));
        assert_eq!(1, engine.config().channel(), "Nothing applies before END.");
        assert_eq!(
            Some(Reconfigured::Updated),
            feed(&mut engine, &mut slot, &["ROOT D", "MAP jy pb END."])
        );

        assert_eq!(2, engine.config().channel());
        assert_eq!(Key::D, engine.config().root_key());
        assert_eq!(
            "CHAN 2\nROOT D\nMAP jy pb END.",
            slot.read().unwrap().as_str(),
            "Expected left but got right"
        );
    }

    #[test]
    fn dump_is_not_collected() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);
        let mut console = Console::new();

        assert_eq!(None, engine.receive_line("dump", &mut slot, &mut console));
        assert_eq!("No config saved\n", console.as_str());

        console.clear();
        assert_eq!(Some(Reconfigured::Updated), engine.receive_line("CHAN 5 END.", &mut slot, &mut console));
        assert_eq!("Updated config\n", console.as_str());
        assert_eq!("CHAN 5 END.", slot.read().unwrap().as_str());

        console.clear();
        assert_eq!(None, engine.receive_line("dump", &mut slot, &mut console));
        assert_eq!("Saved config:\nCHAN 5 END.\n---\n", console.as_str(), "Expected left but got right");
    }

    #[test]
    fn hexdump_shows_raw_record() {
        let (mut engine, mut slot) = engine("CHAN 5 END.");
        let mut console = Console::new();

        assert_eq!(None, engine.receive_line("hdmp", &mut slot, &mut console));
        assert_eq!(HEXDUMP_LEN / 16, console.lines().count());

        let mut lines = console.lines();
        assert_eq!(
            Some("00000000: 314e 554e feff ffff 0c00 0000 4348 414e  1NUN........CHAN"),
            lines.next(),
            "Expected magic, flags, length, then text"
        );
        assert_eq!(
            Some("00000010: 2035 2045 4e44 2e00 ffff ffff ffff ffff   5 END.........."),
            lines.next()
        );
    }

    #[test]
    fn dump_inside_configuration_is_collected() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);
        assert_eq!(
            Some(Reconfigured::RevertedToDefault),
            feed(&mut engine, &mut slot, &["CHAN 5", "dump", "END."]),
            "dump is not a command"
        );
    }

    #[test]
    fn failed_parse_reverts_to_saved() {
        let (mut engine, mut slot) = engine("CHAN 3 END.");
        assert!(!engine.has_fault());

        assert_eq!(
            Reconfigured::RevertedToSaved,
            engine.reconfigure("CHAN 4 ROOT X END.", &mut slot, &mut Console::new())
        );
        assert_eq!(3, engine.config().channel());
        assert!(engine.has_fault());
        assert_eq!("CHAN 3 END.", slot.read().unwrap().as_str(), "A rejected config is never saved");

        assert_eq!(Reconfigured::Updated, engine.reconfigure("CHAN 4 END.", &mut slot, &mut Console::new()));
        assert!(!engine.has_fault(), "Success clears the fault");
    }

    #[test]
    fn failed_parse_reverts_to_default() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);
        let mut console = Console::new();
        assert_eq!(
            Reconfigured::RevertedToDefault,
            engine.reconfigure("CHAN 4 XYZZY END.", &mut slot, &mut console)
        );
        assert_eq!(
            "Error: malformed token at char 7 ('XYZZY')\nReverting to default config\n",
            console.as_str(),
            "Expected left but got right"
        );
        assert_eq!(1, engine.config().channel());
        assert_eq!(6, engine.config().mappings().len());
        assert!(engine.has_fault());
    }

    #[test]
    fn clamped_values_raise_fault() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);
        let mut console = Console::new();
        assert_eq!(Reconfigured::Updated, engine.reconfigure("CHAN 300 END.", &mut slot, &mut console));
        assert_eq!(15, engine.config().channel());
        assert!(engine.has_fault());
        assert_eq!(
            "Warning: integer out of range at char 5 ('300')\nUpdated config\n",
            console.as_str()
        );
    }

    #[test]
    fn truncated_text_names_its_end() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);
        let mut console = Console::new();
        engine.reconfigure("ROOT", &mut slot, &mut console);
        assert_eq!(
            Some("Error: malformed token at char 4 (end of text)"),
            console.lines().next()
        );
    }

    #[test]
    fn failed_save_still_updates() {
        let mut slot = SaveSlot::new(MemStorage::<8192>::new(1024, 256).power_loss_after(0)).unwrap();
        let mut engine = Engine::boot(&mut slot);
        let mut console = Console::new();

        assert_eq!(Reconfigured::Updated, engine.reconfigure("CHAN 4 END.", &mut slot, &mut console));
        assert_eq!(4, engine.config().channel(), "The new config is active even though it wasn't saved");
        assert!(engine.has_fault());
        assert!(!slot.is_valid());
        assert_eq!(
            "Unable to save config: storage medium failure\nUpdated config\n",
            console.as_str()
        );
    }

    #[test]
    fn overlong_configuration_is_discarded() {
        let mut slot = slot();
        let mut engine = Engine::boot(&mut slot);

        let mut line: heapless::String<1000> = heapless::String::new();
        while line.len() < line.capacity() {
            line.push('#').unwrap();
        }
        for _ in 0..5 {
            assert_eq!(None, engine.receive_line(&line, &mut slot, &mut Console::new()));
        }
        assert!(engine.has_fault());

        assert_eq!(Some(Reconfigured::Updated), engine.receive_line("CHAN 3 END.", &mut slot, &mut Console::new()));
        assert_eq!("CHAN 3 END.", slot.read().unwrap().as_str());
    }

    fn sample(accel_x: f32, button_c: bool, button_z: bool) -> SensorReading {
        SensorReading {
            accel_x,
            button_c,
            button_z,
            ..Default::default()
        }
    }

    #[test]
    fn control_changes_are_sent_on_change() {
        let (mut engine, _slot) = engine("CHAN 0 MAP ax 0 1 0 127 cc 7 END.");
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();
        let now = Instant::from_millis(0);

        sensor.update(sample(0.5, false, false));
        engine.tick(now, &sensor, &mut midi).unwrap();
        assert_eq!([[0xB0, 7, 64]], midi.take().as_slice());

        sensor.update(sample(0.5, false, false));
        engine.tick(now, &sensor, &mut midi).unwrap();
        assert!(midi.take().is_empty(), "Unchanged values are not resent");

        sensor.update(sample(1.5, false, false));
        engine.tick(now, &sensor, &mut midi).unwrap();
        assert_eq!([[0xB0, 7, 127]], midi.take().as_slice());
    }

    #[test]
    fn pitch_bend_is_sent() {
        let (mut engine, _slot) = engine("CHAN 2 MAP jy pb END.");
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();
        sensor.update(SensorReading::default());

        engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        assert_eq!([[0xE2, 0x00, 0x40]], midi.take().as_slice());
    }

    /// A transmitter whose cable has been pulled.
    struct Unplugged;

    impl MidiOut for Unplugged {
        type Error = ();

        fn send(&mut self, _message: &wmidi::MidiMessage<'_>) -> Result<(), ()> {
            Err(())
        }
    }

    #[test]
    fn failed_send_is_retried() {
        let (mut engine, _slot) = engine("CHAN 0 MAP ax 0 1 0 127 cc 7 END.");
        let mut sensor = SensorState::default();
        sensor.update(sample(0.5, false, false));

        assert_eq!(Err(()), engine.tick(Instant::from_millis(0), &sensor, &mut Unplugged));

        let mut midi = Recorder::default();
        engine.tick(Instant::from_millis(1), &sensor, &mut midi).unwrap();
        assert_eq!([[0xB0, 7, 64]], midi.take().as_slice());
    }

    #[test]
    fn failed_release_is_retried() {
        let (mut engine, _slot) = engine(NOTES);
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();

        sensor.update(sample(0.45, false, true));
        engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        assert_eq!([[0x90, 64, 127]], midi.take().as_slice());

        sensor.update(sample(0.45, false, false));
        assert_eq!(Err(()), engine.tick(Instant::from_millis(10), &sensor, &mut Unplugged));

        sensor.update(sample(0.45, false, false));
        engine.tick(Instant::from_millis(20), &sensor, &mut midi).unwrap();
        assert_eq!([[0x80, 64, 0]], midi.take().as_slice(), "The note must not be left sounding");

        engine.tick(Instant::from_millis(30), &sensor, &mut midi).unwrap();
        assert!(midi.take().is_empty(), "Released only once");
    }

    const NOTES: &str = "CHAN 0 ROOT C SCALE 0 4 7 OCTAVES 3 3 BPM 120 DIV 0.5 MAP ax 0 1 60 67 note END.";

    #[test]
    fn z_plays_and_releases_note() {
        let (mut engine, _slot) = engine(NOTES);
        assert_eq!(Duration::from_millis(250), engine.config().auto_repeat());
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();

        sensor.update(sample(0.45, false, true));
        let tick = engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        assert!(tick.note_triggered);
        assert_eq!([[0x90, 64, 127]], midi.take().as_slice());

        sensor.update(sample(0.9, false, true));
        let tick = engine.tick(Instant::from_millis(10), &sensor, &mut midi).unwrap();
        assert!(!tick.note_triggered, "Holding Z alone doesn't retrigger");
        assert!(midi.take().is_empty(), "Note mappings send nothing by themselves");

        sensor.update(sample(0.9, false, false));
        engine.tick(Instant::from_millis(20), &sensor, &mut midi).unwrap();
        assert_eq!([[0x80, 64, 0]], midi.take().as_slice());
    }

    #[test]
    fn pressing_z_again_replaces_note() {
        let (mut engine, _slot) = engine(NOTES);
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();

        sensor.update(sample(0.45, false, true));
        engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        sensor.update(sample(0.9, false, false));
        engine.tick(Instant::from_millis(10), &sensor, &mut midi).unwrap();
        sensor.update(sample(0.9, false, true));
        engine.tick(Instant::from_millis(20), &sensor, &mut midi).unwrap();

        assert_eq!([[0x90, 64, 127], [0x80, 64, 0], [0x90, 67, 127]], midi.take().as_slice());
    }

    #[test]
    fn holding_c_and_z_auto_repeats() {
        let (mut engine, _slot) = engine(NOTES);
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();

        sensor.update(sample(0.45, true, true));
        engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        assert_eq!([[0x90, 64, 127]], midi.take().as_slice());

        sensor.update(sample(0.9, true, true));
        engine.tick(Instant::from_millis(100), &sensor, &mut midi).unwrap();
        assert!(midi.take().is_empty(), "Too soon to repeat");

        let tick = engine.tick(Instant::from_millis(250), &sensor, &mut midi).unwrap();
        assert!(tick.note_triggered);
        assert_eq!([[0x80, 64, 0], [0x90, 67, 127]], midi.take().as_slice());

        engine.tick(Instant::from_millis(600), &sensor, &mut midi).unwrap();
        assert!(midi.take().is_empty(), "The same note is not repeated");
    }

    #[test]
    fn note_is_released_on_its_own_channel() {
        let (mut engine, mut slot) = engine(NOTES);
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();

        sensor.update(sample(0.45, false, true));
        engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        engine.reconfigure("CHAN 3 END.", &mut slot, &mut Console::new());

        sensor.update(sample(0.45, false, false));
        engine.tick(Instant::from_millis(10), &sensor, &mut midi).unwrap();
        assert_eq!([[0x90, 64, 127], [0x80, 64, 0]], midi.take().as_slice());
    }

    #[test]
    fn notes_disabled_without_note_mapping() {
        let (mut engine, _slot) = engine("MAP ax cc 1 END.");
        let mut midi = Recorder::default();
        let mut sensor = SensorState::default();

        sensor.update(sample(1.0, true, true));
        let tick = engine.tick(Instant::from_millis(0), &sensor, &mut midi).unwrap();
        assert!(!tick.note_triggered);
        assert_eq!([[0xB1, 1, 127]], midi.take().as_slice());
    }

    #[test]
    fn silence_releases_every_note() {
        let (mut engine, _slot) = engine("CHAN 9 END.");
        let mut midi = Recorder::default();
        engine.silence(&mut midi).unwrap();

        let sent = midi.take();
        assert_eq!(119, sent.len());
        assert_eq!([0x89, 1, 0], sent[0]);
        assert_eq!([0x89, 119, 0], sent[118]);
    }
}
