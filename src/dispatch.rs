//! Request dispatch
//!
//! Decodes one framed request, routes it to its handler and queues either
//! the reply or an error packet for the client, in the client's byte order.

use area_randr_proto::{ByteOrder, ErrorReply, Request, RequestHeader};
use tracing::{debug, trace, warn};

use crate::client::ClientId;
use crate::display::DisplayState;
use crate::error::{Result, RrError};

impl DisplayState {
    /// Process one request from `client`. `body` is everything after the
    /// four header bytes.
    pub fn handle_request(&mut self, client: ClientId, header: RequestHeader, body: &[u8]) {
        let (Some(order), Some(sequence)) =
            (self.clients.order(client), self.clients.next_sequence(client))
        else {
            warn!("Request from unknown client {}", client.0);
            return;
        };

        match self.dispatch(client, order, sequence, header, body) {
            Ok(Some(reply)) => self.clients.send(client, reply),
            Ok(None) => {}
            Err(err) => self.send_error(client, order, sequence, header, err),
        }
    }

    /// Answer a request whose length field the connection refused to read
    /// a body for. It still takes a sequence number.
    pub fn reject_request_length(&mut self, client: ClientId, header: RequestHeader) {
        let (Some(order), Some(sequence)) =
            (self.clients.order(client), self.clients.next_sequence(client))
        else {
            warn!("Request from unknown client {}", client.0);
            return;
        };
        self.send_error(client, order, sequence, header, RrError::Length);
    }

    fn send_error(
        &mut self,
        client: ClientId,
        order: ByteOrder,
        sequence: u16,
        header: RequestHeader,
        err: RrError,
    ) {
        debug!(
            "Request {}.{} from client {} failed: {}",
            header.major_opcode, header.minor_opcode, client.0, err
        );
        let packet = ErrorReply {
            code: err.code(self.extension.first_error),
            bad_value: err.bad_value(),
            minor_opcode: u16::from(header.minor_opcode),
            major_opcode: header.major_opcode,
        }
        .serialize(order, sequence);
        self.clients.send(client, packet);
    }

    fn dispatch(
        &mut self,
        client: ClientId,
        order: ByteOrder,
        sequence: u16,
        header: RequestHeader,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        if header.major_opcode != self.extension.major_opcode {
            return Err(RrError::Request(header.major_opcode));
        }

        let request = Request::parse(order, header.minor_opcode, body)?;
        trace!("Client {} #{}: {:?}", client.0, sequence, request);

        let reply = match request {
            Request::SelectInput(request) => {
                self.select_input(client, &request)?;
                None
            }
            Request::ListOutputProperties(request) => Some(
                self.list_output_properties(&request)?
                    .serialize(order, sequence),
            ),
            Request::QueryOutputProperty(request) => Some(
                self.query_output_property(&request)?
                    .serialize(order, sequence),
            ),
            Request::ConfigureOutputProperty(request) => {
                self.configure_output_property(&request)?;
                None
            }
            Request::ChangeOutputProperty(request) => {
                self.change_output_property(&request, order)?;
                None
            }
            Request::DeleteOutputProperty(request) => {
                self.delete_output_property(&request)?;
                None
            }
            Request::GetOutputProperty(request) => Some(
                self.get_output_property(&request)?
                    .serialize(order, sequence),
            ),
        };
        Ok(reply)
    }
}
