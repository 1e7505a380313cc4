//! RandR output property request handlers
//!
//! One method per request. Each validates its parameters in protocol order,
//! resolves the output, and either returns a reply or the first error hit.

use area_randr_proto::{
    pad_len, swap_elements, ByteOrder, ChangeOutputProperty, ConfigureOutputProperty,
    DeleteOutputProperty, GetOutputProperty, GetOutputPropertyReply, ListOutputProperties,
    ListOutputPropertiesReply, QueryOutputProperty, QueryOutputPropertyReply, SelectInput,
};
use tracing::debug;
use x11rb::protocol::xproto::{AtomEnum, Timestamp};

use crate::atoms::AtomTable;
use crate::client::ClientId;
use crate::display::DisplayState;
use crate::error::{Result, RrError};
use crate::notify::Notifier;
use crate::output::{Access, OutputTable};
use crate::property::{Format, PropertyChange, PropertyFlags, PropertyMode};

/// Largest unit count whose byte size still fits a request
const MAX_CHANGE_UNITS: u32 = (u32::MAX - ChangeOutputProperty::FIXED_SIZE as u32).div_ceil(4);

impl DisplayState {
    /// Borrow the pieces a request needs to mutate outputs and notify
    pub(crate) fn split(&mut self) -> (&AtomTable, &mut OutputTable, Notifier<'_>) {
        let Self {
            atoms,
            outputs,
            windows,
            clients,
            phase,
            clock,
            ..
        } = self;
        let notifier = Notifier::new(windows, clients, *phase, clock.now());
        (atoms, outputs, notifier)
    }

    fn update_time(&mut self) -> Timestamp {
        self.clock.update()
    }

    pub fn select_input(&mut self, client: ClientId, request: &SelectInput) -> Result<()> {
        self.windows
            .select_input(request.window, client, request.enable)?;
        debug!(
            "Client {} selected {:#x} on window {:#x}",
            client.0, request.enable, request.window
        );
        Ok(())
    }

    pub fn list_output_properties(
        &self,
        request: &ListOutputProperties,
    ) -> Result<ListOutputPropertiesReply> {
        let output = self.outputs.resolve(request.output, Access::Read)?;
        Ok(ListOutputPropertiesReply {
            atoms: output.properties().names(),
        })
    }

    pub fn query_output_property(
        &self,
        request: &QueryOutputProperty,
    ) -> Result<QueryOutputPropertyReply> {
        let output = self.outputs.resolve(request.output, Access::Read)?;
        let record = output
            .properties()
            .find(request.property)
            .ok_or(RrError::Name(request.property))?;

        Ok(QueryOutputPropertyReply {
            pending: record.is_pending(),
            range: record.is_range(),
            immutable: record.is_immutable(),
            valid_values: record.valid_values().to_vec(),
        })
    }

    /// Clients can never create immutable properties
    pub fn configure_output_property(&mut self, request: &ConfigureOutputProperty) -> Result<()> {
        let output = self.outputs.resolve_mut(request.output, Access::Read)?;
        if output.is_leased() {
            return Err(RrError::Access(request.output));
        }
        let flags = PropertyFlags::from_bools(request.pending, request.range, false);
        output.configure_property(request.property, flags, &request.values)
    }

    /// `order` is the client's byte order; the data is stored in host order
    pub fn change_output_property(
        &mut self,
        request: &ChangeOutputProperty,
        order: ByteOrder,
    ) -> Result<()> {
        self.update_time();

        let mode = PropertyMode::try_from(request.mode)?;
        let format = Format::try_from(request.format)?;
        if request.num_units > MAX_CHANGE_UNITS {
            return Err(RrError::Length);
        }
        let total = request.num_units as usize * format.unit_size();
        if request.data.len() != total + pad_len(total) {
            return Err(RrError::Length);
        }

        let (atoms, outputs, mut notifier) = self.split();
        let output = outputs.resolve_mut(request.output, Access::Read)?;
        if !atoms.is_valid(request.property) {
            return Err(RrError::Atom(request.property));
        }
        if !atoms.is_valid(request.type_) {
            return Err(RrError::Atom(request.type_));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(total)?;
        data.extend_from_slice(&request.data[..total]);
        if order.is_swapped() {
            swap_elements(&mut data, request.format);
        }

        let change = PropertyChange {
            property: request.property,
            type_: request.type_,
            format,
            mode,
            data: &data,
            notify: true,
            pending: true,
        };
        output.change_property(&change, &mut notifier)
    }

    pub fn delete_output_property(&mut self, request: &DeleteOutputProperty) -> Result<()> {
        self.update_time();

        let (atoms, outputs, mut notifier) = self.split();
        let output = outputs.resolve_mut(request.output, Access::Read)?;
        if output.is_leased() {
            return Err(RrError::Access(request.output));
        }
        if !atoms.is_valid(request.property) {
            return Err(RrError::Atom(request.property));
        }
        output.delete_property(request.property, &mut notifier)
    }

    /// Read a window of a property value, optionally deleting the property
    /// once the window reaches its end
    pub fn get_output_property(
        &mut self,
        request: &GetOutputProperty,
    ) -> Result<GetOutputPropertyReply> {
        if request.delete != 0 {
            self.update_time();
        }
        let access = if request.delete != 0 {
            Access::Write
        } else {
            Access::Read
        };

        let (atoms, outputs, mut notifier) = self.split();
        let output = outputs.resolve_mut(request.output, access)?;
        if !atoms.is_valid(request.property) {
            return Err(RrError::Atom(request.property));
        }
        if request.delete > 1 {
            return Err(RrError::Value(u32::from(request.delete)));
        }
        let delete = request.delete == 1;
        let any_type = u32::from(AtomEnum::ANY);
        if request.type_ != any_type && !atoms.is_valid(request.type_) {
            return Err(RrError::Atom(request.type_));
        }

        let Some(record) = output.properties().find(request.property) else {
            return Ok(GetOutputPropertyReply::default());
        };
        if record.is_immutable() && delete {
            return Err(RrError::Access(request.property));
        }

        let value = output
            .get_property(request.property, request.pending)
            .ok_or(RrError::Atom(request.property))?;

        if request.type_ != any_type && request.type_ != value.type_() {
            // Report what is there without handing out the data
            return Ok(GetOutputPropertyReply {
                format: value.format_bits(),
                type_: value.type_(),
                bytes_after: value.len() as u32,
                num_items: 0,
                data: Vec::new(),
            });
        }

        let size = value.data().len() as u64;
        let start = u64::from(request.long_offset) * 4;
        if start > size {
            return Err(RrError::Value(request.long_offset));
        }
        let len = (size - start).min(u64::from(request.long_length) * 4);
        let bytes_after = (size - start - len) as u32;
        let window = &value.data()[start as usize..(start + len) as usize];

        let mut data = Vec::new();
        data.try_reserve_exact(window.len())?;
        data.extend_from_slice(window);

        let unit_size = value.format().map_or(0, Format::unit_size);
        let reply = GetOutputPropertyReply {
            format: value.format_bits(),
            type_: value.type_(),
            bytes_after,
            num_items: if unit_size == 0 {
                0
            } else {
                (data.len() / unit_size) as u32
            },
            data,
        };

        if delete && bytes_after == 0 {
            output.delete_property(request.property, &mut notifier)?;
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Outbox, OUTBOX_CAPACITY};
    use crate::config::ExtensionConfig;
    use crate::notify::ServerPhase;
    use crate::output::Output;
    use area_randr_proto::{OutputPropertyNotify, PropertyState};
    use tokio::sync::mpsc;

    const OUTPUT: u32 = 0x42;
    const ROOT: u32 = 0x100;
    const INTEGER: u32 = 19;
    const CARDINAL: u32 = 6;
    const ME: ClientId = ClientId(1);

    struct Fixture {
        state: DisplayState,
        events: mpsc::Receiver<Vec<u8>>,
        edid: u32,
        backlight: u32,
    }

    impl Fixture {
        fn new() -> Self {
            let mut state = DisplayState::new(ExtensionConfig::default());
            state.windows_mut().add_root(ROOT);
            let non_desktop = state.atoms_mut().intern(crate::atoms::NON_DESKTOP);
            let edid = state.atoms_mut().intern("EDID");
            let backlight = state.atoms_mut().intern("Backlight");
            state
                .outputs_mut()
                .insert(Output::new(OUTPUT, "DP-1", ROOT, non_desktop));

            let (tx, events, _) = Outbox::new(OUTBOX_CAPACITY);
            state.add_client(ME, ByteOrder::native(), tx);
            state
                .select_input(
                    ME,
                    &SelectInput {
                        window: ROOT,
                        enable: 8,
                    },
                )
                .unwrap();

            Self {
                state,
                events,
                edid,
                backlight,
            }
        }

        fn change(&mut self, property: u32, mode: u8, values: &[u32]) -> Result<()> {
            self.state.change_output_property(
                &ChangeOutputProperty {
                    output: OUTPUT,
                    property,
                    type_: INTEGER,
                    format: 32,
                    mode,
                    num_units: values.len() as u32,
                    data: bytemuck::cast_slice(values).to_vec(),
                },
                ByteOrder::native(),
            )
        }

        fn get(&mut self, property: u32, offset: u32, length: u32, delete: u8) -> Result<GetOutputPropertyReply> {
            self.state.get_output_property(&GetOutputProperty {
                output: OUTPUT,
                property,
                type_: 0,
                long_offset: offset,
                long_length: length,
                delete,
                pending: false,
            })
        }

        fn drain_events(&mut self) -> Vec<OutputPropertyNotify> {
            let mut events = Vec::new();
            while let Ok(packet) = self.events.try_recv() {
                let (property, state) = (
                    u32::from_ne_bytes([packet[12], packet[13], packet[14], packet[15]]),
                    packet[20],
                );
                events.push(OutputPropertyNotify {
                    window: u32::from_ne_bytes([packet[4], packet[5], packet[6], packet[7]]),
                    output: u32::from_ne_bytes([packet[8], packet[9], packet[10], packet[11]]),
                    atom: property,
                    timestamp: u32::from_ne_bytes([packet[16], packet[17], packet[18], packet[19]]),
                    state: if state == 0 {
                        PropertyState::NewValue
                    } else {
                        PropertyState::Delete
                    },
                });
            }
            events
        }
    }

    #[test]
    fn test_change_then_get_round_trip() {
        let mut f = Fixture::new();
        f.change(f.edid, 0, &[10, 20, 30]).unwrap();

        let reply = f.get(f.edid, 0, 100, 0).unwrap();
        assert_eq!(reply.format, 32);
        assert_eq!(reply.type_, INTEGER);
        assert_eq!(reply.num_items, 3);
        assert_eq!(reply.bytes_after, 0);
        assert_eq!(reply.data, bytemuck::cast_slice::<u32, u8>(&[10, 20, 30]).to_vec());

        let events = f.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, PropertyState::NewValue);
        assert_eq!(events[0].atom, f.edid);
    }

    #[test]
    fn test_change_validation_order() {
        let mut f = Fixture::new();
        assert_eq!(f.change(f.edid, 3, &[1]), Err(RrError::Value(3)));

        let mut request = ChangeOutputProperty {
            output: OUTPUT,
            property: f.edid,
            type_: INTEGER,
            format: 24,
            mode: 0,
            num_units: 1,
            data: vec![0; 4],
        };
        let order = ByteOrder::native();
        assert_eq!(f.state.change_output_property(&request, order), Err(RrError::Value(24)));

        request.format = 8;
        request.num_units = u32::MAX;
        assert_eq!(f.state.change_output_property(&request, order), Err(RrError::Length));

        // three bytes pad to one word
        request.num_units = 3;
        assert!(f.state.change_output_property(&request, order).is_ok());
        request.num_units = 5;
        assert_eq!(f.state.change_output_property(&request, order), Err(RrError::Length));

        request.num_units = 4;
        request.output = 0x99;
        assert_eq!(f.state.change_output_property(&request, order), Err(RrError::Output(0x99)));

        request.output = OUTPUT;
        request.property = 5000;
        assert_eq!(f.state.change_output_property(&request, order), Err(RrError::Atom(5000)));
        request.property = f.edid;
        request.type_ = 0;
        assert_eq!(f.state.change_output_property(&request, order), Err(RrError::Atom(0)));
    }

    #[test]
    fn test_swapped_client_data_stored_in_host_order() {
        let mut f = Fixture::new();
        let foreign = if ByteOrder::native() == ByteOrder::Lsb {
            ByteOrder::Msb
        } else {
            ByteOrder::Lsb
        };
        let mut data = 0x0102_0304u32.to_ne_bytes().to_vec();
        data.reverse();
        f.state
            .change_output_property(
                &ChangeOutputProperty {
                    output: OUTPUT,
                    property: f.edid,
                    type_: INTEGER,
                    format: 32,
                    mode: 0,
                    num_units: 1,
                    data,
                },
                foreign,
            )
            .unwrap();

        let reply = f.get(f.edid, 0, 1, 0).unwrap();
        assert_eq!(reply.data, 0x0102_0304u32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_get_windows_cover_value() {
        let mut f = Fixture::new();
        f.change(f.edid, 0, &[1, 2, 3, 4, 5]).unwrap();

        let mut collected = Vec::new();
        let mut offset = 0;
        loop {
            let reply = f.get(f.edid, offset, 2, 0).unwrap();
            collected.extend_from_slice(&reply.data);
            offset += reply.data.len() as u32 / 4;
            assert_eq!(reply.bytes_after as usize, 20 - collected.len());
            if reply.bytes_after == 0 {
                break;
            }
        }
        assert_eq!(collected, bytemuck::cast_slice::<u32, u8>(&[1, 2, 3, 4, 5]).to_vec());

        // offset at the end is fine, past it is not
        assert_eq!(f.get(f.edid, 5, 1, 0).unwrap().num_items, 0);
        assert_eq!(f.get(f.edid, 6, 1, 0), Err(RrError::Value(6)));
    }

    #[test]
    fn test_get_missing_and_mismatched_type() {
        let mut f = Fixture::new();
        let reply = f.get(f.backlight, 0, 1, 0).unwrap();
        assert_eq!(reply, GetOutputPropertyReply::default());

        f.change(f.edid, 0, &[7, 8]).unwrap();
        let reply = f
            .state
            .get_output_property(&GetOutputProperty {
                output: OUTPUT,
                property: f.edid,
                type_: CARDINAL,
                long_offset: 0,
                long_length: 10,
                delete: 1,
                pending: false,
            })
            .unwrap();
        assert_eq!(reply.type_, INTEGER);
        assert_eq!(reply.format, 32);
        assert_eq!(reply.bytes_after, 2);
        assert!(reply.data.is_empty());
        // mismatch never deletes
        assert!(f.state.outputs().get(OUTPUT).unwrap().properties().find(f.edid).is_some());

        assert_eq!(f.get(0, 0, 1, 0), Err(RrError::Atom(0)));
        assert_eq!(f.get(f.edid, 0, 1, 2), Err(RrError::Value(2)));
    }

    #[test]
    fn test_get_with_delete_at_end() {
        let mut f = Fixture::new();
        f.change(f.edid, 0, &[1, 2]).unwrap();
        f.drain_events();

        // partial read keeps the property
        let reply = f.get(f.edid, 0, 1, 1).unwrap();
        assert_eq!(reply.bytes_after, 4);
        assert!(f.drain_events().is_empty());

        let reply = f.get(f.edid, 1, 1, 1).unwrap();
        assert_eq!(reply.bytes_after, 0);
        let events = f.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, PropertyState::Delete);
        assert!(f.state.outputs().get(OUTPUT).unwrap().properties().is_empty());
    }

    #[test]
    fn test_get_with_delete_needs_write_access() {
        let mut f = Fixture::new();
        f.change(f.edid, 0, &[1]).unwrap();
        f.state
            .outputs_mut()
            .get_mut(OUTPUT)
            .unwrap()
            .set_read_only(true);

        assert!(f.get(f.edid, 0, 1, 0).is_ok());
        assert_eq!(f.get(f.edid, 0, 1, 1), Err(RrError::Access(OUTPUT)));
    }

    #[test]
    fn test_immutable_refusals() {
        let mut f = Fixture::new();
        f.state
            .outputs_mut()
            .get_mut(OUTPUT)
            .unwrap()
            .configure_property(f.edid, PropertyFlags::IMMUTABLE, &[])
            .unwrap();
        f.change(f.edid, 0, &[1]).unwrap();

        let configure = ConfigureOutputProperty {
            output: OUTPUT,
            property: f.edid,
            pending: false,
            range: false,
            values: Vec::new(),
        };
        assert_eq!(
            f.state.configure_output_property(&configure),
            Err(RrError::Access(f.edid))
        );
        assert_eq!(
            f.state.delete_output_property(&DeleteOutputProperty {
                output: OUTPUT,
                property: f.edid,
            }),
            Err(RrError::Access(f.edid))
        );
        assert_eq!(f.get(f.edid, 0, 1, 1), Err(RrError::Access(f.edid)));
        assert!(f.get(f.edid, 0, 1, 0).is_ok());
    }

    #[test]
    fn test_configure_query_and_list() {
        let mut f = Fixture::new();
        f.state
            .configure_output_property(&ConfigureOutputProperty {
                output: OUTPUT,
                property: f.backlight,
                pending: true,
                range: true,
                values: vec![0, 100],
            })
            .unwrap();
        f.change(f.edid, 0, &[1]).unwrap();

        let query = f
            .state
            .query_output_property(&QueryOutputProperty {
                output: OUTPUT,
                property: f.backlight,
            })
            .unwrap();
        assert!(query.pending && query.range && !query.immutable);
        assert_eq!(query.valid_values, vec![0, 100]);

        let list = f
            .state
            .list_output_properties(&ListOutputProperties { output: OUTPUT })
            .unwrap();
        let mut expected = vec![f.edid, f.backlight];
        expected.sort_unstable();
        assert_eq!(list.atoms, expected);

        assert_eq!(
            f.state
                .query_output_property(&QueryOutputProperty {
                    output: OUTPUT,
                    property: 4,
                })
                .map(|q| q.pending),
            Err(RrError::Name(4))
        );
        assert_eq!(
            f.state
                .configure_output_property(&ConfigureOutputProperty {
                    output: OUTPUT,
                    property: f.backlight,
                    pending: false,
                    range: true,
                    values: vec![1],
                }),
            Err(RrError::Match)
        );
    }

    #[test]
    fn test_leased_output_refuses_configure_and_delete() {
        let mut f = Fixture::new();
        f.change(f.edid, 0, &[1]).unwrap();
        f.state.outputs_mut().get_mut(OUTPUT).unwrap().set_leased(true);

        assert_eq!(
            f.state.configure_output_property(&ConfigureOutputProperty {
                output: OUTPUT,
                property: f.backlight,
                pending: false,
                range: false,
                values: Vec::new(),
            }),
            Err(RrError::Access(OUTPUT))
        );
        assert_eq!(
            f.state.delete_output_property(&DeleteOutputProperty {
                output: OUTPUT,
                property: f.edid,
            }),
            Err(RrError::Access(OUTPUT))
        );
    }

    #[test]
    fn test_delete_checks() {
        let mut f = Fixture::new();
        let delete = |property| DeleteOutputProperty {
            output: OUTPUT,
            property,
        };
        assert_eq!(f.state.delete_output_property(&delete(0)), Err(RrError::Atom(0)));
        assert_eq!(
            f.state.delete_output_property(&delete(f.edid)),
            Err(RrError::Name(f.edid))
        );
        f.change(f.edid, 0, &[1]).unwrap();
        f.drain_events();
        f.state.delete_output_property(&delete(f.edid)).unwrap();
        assert_eq!(f.drain_events()[0].state, PropertyState::Delete);
    }

    #[test]
    fn test_pending_change_then_commit() {
        let mut f = Fixture::new();
        f.state
            .configure_output_property(&ConfigureOutputProperty {
                output: OUTPUT,
                property: f.backlight,
                pending: true,
                range: true,
                values: vec![0, 100],
            })
            .unwrap();
        f.change(f.backlight, 0, &[60]).unwrap();
        f.drain_events();

        let pending = f
            .state
            .get_output_property(&GetOutputProperty {
                output: OUTPUT,
                property: f.backlight,
                type_: 0,
                long_offset: 0,
                long_length: 1,
                delete: 0,
                pending: true,
            })
            .unwrap();
        assert_eq!(pending.data, 60u32.to_ne_bytes().to_vec());
        assert!(f.get(f.backlight, 0, 1, 0).unwrap().data.is_empty());

        assert!(f.state.post_pending_properties());
        assert_eq!(f.drain_events().len(), 1);
        assert_eq!(f.get(f.backlight, 0, 1, 0).unwrap().data, 60u32.to_ne_bytes().to_vec());

        // nothing staged since
        assert!(f.state.post_pending_properties());
        assert!(f.drain_events().is_empty());
    }

    #[test]
    fn test_no_events_while_resetting() {
        let mut f = Fixture::new();
        f.state.set_phase(ServerPhase::Resetting);
        f.change(f.edid, 0, &[1]).unwrap();
        assert!(f.drain_events().is_empty());
    }
}
