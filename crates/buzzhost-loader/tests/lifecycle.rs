//! Instance lifecycle against fake in-process machines.
//!
//! Run with:
//! ```bash
//! cargo test -p buzzhost-loader --test lifecycle
//! ```

#[macro_use]
mod common;

use buzzhost_loader::abi::*;
use buzzhost_loader::machine::HEADER_GENERATOR;
use buzzhost_loader::{
    Generation, InitOrder, Loader, LoaderConfig, MachineLibrary, MachineProperty,
    ParameterProperty, PropertyValue, Tempo,
};
use common::*;

fn plain_decl() -> InfoDecl {
    InfoDecl {
        min_tracks: 1,
        max_tracks: 2,
        globals: vec![
            param(PT_BYTE, c"Level", 0, 0x80, 0xff, MPF_STATE, 0x40),
            param(PT_WORD, c"Length", 1, 0xfffe, 0xffff, MPF_STATE, 16),
        ],
        tracks: vec![param(PT_NOTE, c"Note", 1, 0x9c, 0, 0, 0)],
        attributes: vec![attribute(c"Gain", 0, 100, 7)],
        ..InfoDecl::default()
    }
}

machine_entry!(plain, &FAKE_VTABLE, plain_decl());

machine_entry!(
    legacy,
    &FAKE_VTABLE,
    InfoDecl {
        version: 14,
        ..plain_decl()
    }
);

machine_entry!(
    single_word,
    &FAKE_VTABLE,
    InfoDecl {
        globals: vec![param(PT_WORD, c"Length", 1, 0xffff, 0, MPF_STATE, 16)],
        ..InfoDecl::default()
    }
);

fn test_loader() -> Loader {
    Loader::new(LoaderConfig {
        probe_on_open: false,
        search_path: Vec::new(),
        ..LoaderConfig::default()
    })
}

fn open_plain(loader: &Loader) -> MachineLibrary {
    loader
        .open_with_entry_points("Fake Plain.so", plain::entry_points())
        .expect("Failed to open fake machine")
}

#[test]
fn test_initialize_call_order() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    take_calls();

    instance.initialize(&[]);

    let calls = take_calls();
    assert_eq!(
        calls,
        vec![
            "init version=0 g0=0 a0=7",
            "osc table true",
            "master spt=5512",
            "attributes_changed g0=0",
            "set_num_tracks 1 g0=0",
        ]
    );
    // Parameters were written after SetNumTracks
    assert_eq!(instance.global_parameter_value(0), 0x40);
    assert_eq!(instance.global_parameter_value(1), 16);
    assert_eq!(instance.attribute_value(0), 7);
}

#[test]
fn test_initialize_reads_blob() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    take_calls();

    instance.initialize(&[3, 0xaa]);

    assert_eq!(take_calls()[0], "init version=3 g0=0 a0=7");
}

#[test]
fn test_params_before_init_quirk() {
    let loader = Loader::new(LoaderConfig {
        probe_on_open: false,
        search_path: Vec::new(),
        params_before_init: vec!["Fake Machine".to_string()],
        ..LoaderConfig::default()
    });
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    take_calls();

    instance.initialize(&[]);

    assert_eq!(take_calls()[0], "init version=0 g0=64 a0=7");
    assert_eq!(InitOrder::default(), InitOrder::ParamsAfterInit);
}

#[test]
fn test_word_parameter_round_trip() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    instance.initialize(&[]);

    assert_eq!(instance.global_parameter_value(1), 16);
    instance.set_global_parameter_value(1, 0x1234);
    assert_eq!(instance.global_parameter_value(1), 0x1234);
    // Neighbouring byte parameter untouched
    assert_eq!(instance.global_parameter_value(0), 0x40);
}

#[test]
fn test_single_word_parameter_machine() {
    let loader = test_loader();
    let machine = loader
        .open_with_entry_points("Single Word.so", single_word::entry_points())
        .unwrap();
    assert_eq!(machine.info().num_global_parameters(), 1);
    assert_eq!(machine.info().num_track_parameters(), 0);
    let mut instance = machine.instantiate().unwrap();
    instance.initialize(&[]);

    assert_eq!(instance.global_parameter_value(0), 16);
    instance.set_global_parameter_value(0, 0x1234);
    assert_eq!(instance.global_parameter_value(0), 0x1234);
    assert_eq!(instance.global_parameter_value(1), 0);
}

#[test]
fn test_out_of_range_access_is_ignored() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    instance.initialize(&[]);

    assert_eq!(instance.global_parameter_value(2), 0);
    instance.set_global_parameter_value(2, 5);
    assert_eq!(instance.track_parameter_value(2, 0), 0);
    instance.set_track_parameter_value(0, 1, 5);
    assert_eq!(instance.track_parameter_value(0, 1), 0);
    assert_eq!(instance.attribute_value(1), 0);
    instance.set_attribute_value(1, 5);
    assert_eq!(instance.describe_value(3, 0), "");
    assert_eq!(instance.describe_value(-1, 0), "");
}

#[test]
fn test_track_parameters() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    instance.initialize(&[]);

    instance.set_track_parameter_value(1, 0, 0x31);
    assert_eq!(instance.track_parameter_value(1, 0), 0x31);
    assert_eq!(instance.track_parameter_value(0, 0), 0);
}

#[test]
fn test_work_and_controls() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    instance.initialize(&[]);
    take_calls();

    let mut block = [0.0f32; 64];
    assert!(instance.run_block(&mut block, WM_WRITE));
    assert!(block.iter().all(|s| *s == 64.0));

    let mut input = [0.5f32; 4];
    let mut output = [0.0f32; 8];
    assert!(instance.run_block_mono_to_stereo(&mut input, &mut output, WM_READWRITE));
    assert_eq!(&output[..2], &[0.5, -0.5]);

    let mut short = [0.0f32; 7];
    assert!(!instance.run_block_mono_to_stereo(&mut input, &mut short, WM_READWRITE));

    instance.tick();
    instance.stop();
    instance.command(0);
    instance.midi_note(1, 60, 100);
    instance.mute_track(1);
    assert!(instance.is_track_muted(1));
    assert!(!instance.is_track_muted(0));

    assert_eq!(
        take_calls(),
        vec![
            "work n=64 mode=2",
            "work_m2s n=4 mode=3",
            "tick",
            "stop",
            "command 0",
            "midi_note 1 60 100",
        ]
    );
}

#[test]
fn test_save_collects_machine_bytes() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let mut instance = machine.instantiate().unwrap();
    instance.initialize(&[]);

    assert_eq!(instance.save_to_vec(), vec![1, 0x40]);

    let mut out = Vec::new();
    instance.save(&mut out).unwrap();
    assert_eq!(out, vec![1, 0x40]);
}

#[test]
fn test_describe_values() {
    let loader = test_loader();
    let mut machine = open_plain(&loader);

    assert_eq!(machine.describe_global_value(1, 16), "16 ticks");
    assert_eq!(machine.describe_global_value(0, 16), "");
    assert_eq!(machine.describe_track_value(0, 5), "track value");
    assert_eq!(machine.describe_track_value(1, 5), "");
}

#[test]
fn test_generation_selection() {
    let loader = test_loader();
    let current = open_plain(&loader);
    assert_eq!(current.generation(), Generation::Current);
    let instance = current.instantiate().unwrap();
    assert_eq!(instance.generation(), Generation::Current);

    let old = loader
        .open_with_entry_points("Fake Legacy.so", legacy::entry_points())
        .unwrap();
    assert_eq!(old.generation(), Generation::Legacy);
    let mut instance = old.instantiate().unwrap();
    instance.initialize(&[]);
    assert_eq!(instance.generation(), Generation::Legacy);
    // Legacy machines have no extended interface to forward to
    assert!(!instance.has_interface_ex());
    instance.add_input("In", false);
    assert_eq!(instance.describe_param(0), "");
}

#[test]
fn test_properties() {
    let loader = test_loader();
    let machine = open_plain(&loader);

    assert_eq!(
        machine.property(MachineProperty::Name),
        PropertyValue::Str("Fake Machine".to_string())
    );
    assert_eq!(
        machine.property(MachineProperty::LibraryName),
        PropertyValue::Str("Fake Plain.so".to_string())
    );
    assert_eq!(machine.property(MachineProperty::Type).as_int(), Some(MT_GENERATOR));
    assert_eq!(machine.property(MachineProperty::NumGlobalParams).as_int(), Some(2));
    assert_eq!(machine.property(MachineProperty::NumTrackParams).as_int(), Some(1));
    assert_eq!(machine.property(MachineProperty::NumInputChannels).as_int(), Some(1));
    assert_eq!(machine.property(MachineProperty::NumOutputChannels).as_int(), Some(1));
    assert_eq!(
        machine.global_parameter_property(1, ParameterProperty::DefaultValue),
        Some(PropertyValue::Int(16))
    );
    assert_eq!(
        machine.track_parameter_property(0, ParameterProperty::Name),
        Some(PropertyValue::Str("Note".to_string()))
    );
    assert_eq!(machine.global_parameter_property(2, ParameterProperty::Name), None);

    let meta = machine.metadata();
    assert_eq!(meta.global_parameters.len(), 2);
    assert_eq!(meta.attributes[0].name, "Gain");
    assert_eq!(meta.command_list(), vec!["About..."]);
}

#[test]
fn test_set_master_info_reaches_machines() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    loader.set_master_info(Tempo {
        beats_per_min: 60,
        ticks_per_beat: 4,
        sample_rate: 48000,
    });
    let mut instance = machine.instantiate().unwrap();
    take_calls();
    instance.initialize(&[]);

    assert!(take_calls().contains(&"master spt=12000".to_string()));
    assert_eq!(loader.config().tempo.beats_per_min, 60);
}

#[test]
fn test_machine_header() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let instance = machine.instantiate().unwrap();

    let header = instance.machine();
    assert_eq!(header.header(), HEADER_GENERATOR);
    assert_eq!(header.info(), instance.info().as_ptr().cast_const());
    assert!(!header.interface().is_null());
    assert_eq!(header.global_size(), 3);
    assert_eq!(header.track_size(), 1);
    assert!(header.interface_ex().is_null());
}

#[test]
fn test_drop_destroys_machine_once() {
    let loader = test_loader();
    let machine = open_plain(&loader);
    let instance = machine.instantiate().unwrap();
    take_calls();

    drop(instance);
    assert_eq!(take_calls(), vec!["destroy"]);

    drop(machine);
    assert!(take_calls().is_empty());
}
