use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;


/// What the fake server saw during one control session
#[derive(Debug, Default, Clone)]
pub(crate) struct ServerState {
    pub commands: Vec<String>,
    pub cwd: String,
    pub uploads: BTreeMap<String, Vec<u8>>,
}

/// Single-session in-process FTP server for tests
pub(crate) struct FakeFtpServer {
    port: u16,
    handle: JoinHandle<ServerState>,
}

impl FakeFtpServer {
    pub async fn start(user: &str, password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (user, password) = (user.to_string(), password.to_string());

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            serve(socket, &user, &password).await
        });
        Self { port, handle }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the client to disconnect and return the recorded session.
    pub async fn finish(self) -> ServerState {
        self.handle.await.unwrap()
    }
}

// `h1,h2,h3,h4,p1,p2` as sent with PORT
fn parse_port_argument(arg: &str) -> SocketAddr {
    let parts: Vec<u16> = arg.split(',').map(|p| p.trim().parse().unwrap()).collect();
    let ip = [parts[0] as u8, parts[1] as u8, parts[2] as u8, parts[3] as u8];
    SocketAddr::from((ip, parts[4] * 256 + parts[5]))
}

fn join(cwd: &str, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else if cwd.ends_with('/') {
        format!("{}{}", cwd, name)
    } else {
        format!("{}/{}", cwd, name)
    }
}

async fn send(control: &mut BufReader<TcpStream>, text: &str) {
    let stream = control.get_mut();
    stream.write_all(text.as_bytes()).await.unwrap();
    stream.write_all(b"\r\n").await.unwrap();
}

async fn serve(socket: TcpStream, user: &str, password: &str) -> ServerState {
    let mut state = ServerState {
        cwd: "/".to_string(),
        ..Default::default()
    };
    let mut control = BufReader::new(socket);
    send(&mut control, "220-Welcome to the test server\r\n220-Uploads only\r\n220 Ready").await;

    let mut pending_user: Option<String> = None;
    let mut logged_in = false;
    let mut passive: Option<TcpListener> = None;
    let mut active: Option<SocketAddr> = None;

    loop {
        let mut line = String::new();
        if control.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end().to_string();
        state.commands.push(line.clone());
        let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));

        match verb {
            "USER" => {
                pending_user = Some(arg.to_string());
                send(&mut control, "331 Password required").await;
            }
            "PASS" => {
                if pending_user.as_deref() == Some(user) && arg == password {
                    logged_in = true;
                    send(&mut control, "230 Logged in").await;
                } else {
                    send(&mut control, "530 Login incorrect").await;
                }
            }
            "QUIT" => {
                send(&mut control, "221 Bye").await;
                break;
            }
            _ if !logged_in => send(&mut control, "530 Please login").await,
            "TYPE" => send(&mut control, "200 Type set").await,
            "CWD" => {
                state.cwd = join(&state.cwd, arg);
                send(&mut control, "250 Directory changed").await;
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                passive = Some(listener);
                let reply = format!("227 Entering Passive Mode (127,0,0,1,{},{}).", port >> 8, port & 0xff);
                send(&mut control, &reply).await;
            }
            "PORT" => {
                active = Some(parse_port_argument(arg));
                send(&mut control, "200 PORT command successful").await;
            }
            "STOR" => {
                let data = if let Some(listener) = passive.take() {
                    send(&mut control, "150 Opening data connection").await;
                    Some(listener.accept().await.unwrap().0)
                } else if let Some(addr) = active.take() {
                    send(&mut control, "150 Opening data connection").await;
                    Some(TcpStream::connect(addr).await.unwrap())
                } else {
                    None
                };
                match data {
                    Some(mut data) => {
                        let mut body = Vec::new();
                        data.read_to_end(&mut body).await.unwrap();
                        state.uploads.insert(join(&state.cwd, arg), body);
                        send(&mut control, "226 Transfer complete").await;
                    }
                    None => send(&mut control, "425 Use PASV or PORT first").await,
                }
            }
            _ => send(&mut control, "502 Command not implemented").await,
        }
    }
    state
}
