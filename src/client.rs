use std::{
    io::{Read, Write},
    net::TcpStream,
    process,
};

use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, BasicHistory, Input};
use prettytable::{Cell, Row, Table};

use crate::{
    command::parse_command,
    common::RequestID,
    config::Config,
    protocol::{read_frame, write_frame, Reply, Request},
    tuple::{FieldDisplay, Tuple},
};

/// A request/reply channel to a server. Requests are answered in order.
pub struct Connection<S> {
    stream: S,
    next_request_id: u32,
}

impl Connection<TcpStream> {
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            next_request_id: 1,
        }
    }

    pub fn request(&mut self, request: &Request) -> Result<Reply> {
        let request_id = RequestID(self.next_request_id);
        self.next_request_id = self.next_request_id.wrapping_add(1);
        write_frame(&mut self.stream, &request.to_frame(request_id))?;
        let frame = read_frame(&mut self.stream)?
            .ok_or_else(|| anyhow!("server closed the connection"))?;
        if frame.request_id != request_id {
            return Err(anyhow!(
                "reply for request {} while waiting for {}",
                frame.request_id.0,
                request_id.0
            ));
        }
        Ok(Reply::deserialize(&frame.body)?)
    }
}

pub fn client_start(config: &Config) -> Result<()> {
    println!("connecting to tupledb server at {}...", config.listen_addr);
    let mut connection = Connection::connect(&config.listen_addr)?;
    println!("connected!");
    println!("Welcome to tupledb!");
    println!("Type \"exit\" or \"quit\" to exit.");
    let mut history = BasicHistory::new().max_entries(100).no_duplicates(true);
    loop {
        if let Ok(cmd) = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Command")
            .history_with(&mut history)
            .interact_text()
        {
            if cmd == "exit" || cmd == "quit" {
                println!("Bye!");
                process::exit(0);
            }
            let request = match parse_command(&cmd) {
                Ok(request) => request,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };
            let reply = connection.request(&request)?;
            println!("{}", render_reply(&reply));
        }
    }
}

pub fn render_reply(reply: &Reply) -> String {
    match reply {
        Reply::Ok { count, tuples } if tuples.is_empty() => {
            format!("ok, {} tuple(s) affected", count)
        }
        Reply::Ok { tuples, .. } => render_tuples(tuples).to_string(),
        Reply::Error { code, message } => format!("error {:#06x}: {}", code, message),
    }
}

fn render_tuples(tuples: &[Tuple]) -> Table {
    let width = tuples
        .iter()
        .map(|t| t.cardinality() as usize)
        .max()
        .unwrap_or(0);
    let mut table_view = Table::new();
    table_view.set_titles(Row::new(
        (0..width).map(|i| Cell::new(&i.to_string())).collect(),
    ));
    for tuple in tuples {
        let cells = tuple
            .fields()
            .map(|field| Cell::new(&FieldDisplay(field).to_string()))
            .collect::<Vec<_>>();
        table_view.add_row(Row::new(cells));
    }
    table_view
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::Arc, thread};

    use super::*;
    use crate::{server::serve, test_helpers::setup_test_instance};

    #[test]
    fn test_render_reply() {
        assert_eq!(
            render_reply(&Reply::Ok {
                count: 0,
                tuples: vec![]
            }),
            "ok, 0 tuple(s) affected"
        );
        assert_eq!(
            render_reply(&Reply::Error {
                code: 0x3702,
                message: "tuple already exists".to_string()
            }),
            "error 0x3702: tuple already exists"
        );
        let rendered = render_reply(&Reply::Ok {
            count: 1,
            tuples: vec![Tuple::from(vec![7i32.to_le_bytes().to_vec(), b"seven".to_vec()])],
        });
        assert!(rendered.contains("| 7 | 'seven' |"));
    }

    #[test]
    fn test_session() -> Result<()> {
        let (_dir, instance) = setup_test_instance()?;
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?.to_string();
        thread::spawn(move || serve(listener, Arc::new(instance)));

        let mut connection = Connection::connect(&addr)?;
        let mut run = |cmd: &str| -> Result<Reply> { connection.request(&parse_command(cmd)?) };

        assert_eq!(
            run("ping")?,
            Reply::Ok {
                count: 0,
                tuples: vec![]
            }
        );
        run("insert 0 ('k', 'hi, this is a test string!', 1)")?;
        assert!(matches!(
            run("insert 0 ('k')")?,
            Reply::Error { code: 0x3702, .. }
        ));
        run("update 0 'k' splice 1 0 4 ''")?;
        let reply = run("update 0 'k' splice 1 0 0 'Bonjour, ', add 2 41")?;
        assert_eq!(
            reply,
            Reply::Ok {
                count: 1,
                tuples: vec![Tuple::from(vec![
                    b"k".to_vec(),
                    b"Bonjour, this is a test string!".to_vec(),
                    42i32.to_le_bytes().to_vec(),
                ])]
            }
        );
        assert!(matches!(
            run("update 0 'k' add 1 1")?,
            Reply::Error { code: 0x1e02, .. }
        ));
        assert_eq!(
            run("update 0 'missing' set 1 = 'x'")?,
            Reply::Ok {
                count: 0,
                tuples: vec![]
            }
        );
        run("delete 0 'k'")?;
        assert_eq!(
            run("select 0 'k'")?,
            Reply::Ok {
                count: 0,
                tuples: vec![]
            }
        );
        Ok(())
    }
}
