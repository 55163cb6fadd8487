// SSH transport for interactive device shells

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use ssh2::{Channel, KeyboardInteractivePrompt, MethodType, Session};

use super::{InteractiveShell, SessionFactory};
use crate::device::Device;
use crate::output::errors::{connect_suggestion, PatrolError};

/// Opens real SSH shells against network devices.
///
/// The algorithm suite is deliberately wide and legacy-inclusive: the
/// targets are often network-OS SSH stacks a decade behind current OpenSSH,
/// and a modern-only suite simply fails the handshake.
pub struct SshSessionFactory {
    connect_timeout: Duration,
}

// Old network gear commonly offers nothing newer than group14/sha1 kex,
// CBC ciphers and ssh-rsa host keys.
const KEX_PREFS: &str = "curve25519-sha256,curve25519-sha256@libssh.org,ecdh-sha2-nistp256,\
    diffie-hellman-group14-sha256,diffie-hellman-group14-sha1,\
    diffie-hellman-group-exchange-sha1,diffie-hellman-group1-sha1";
const HOST_KEY_PREFS: &str =
    "ssh-ed25519,ecdsa-sha2-nistp256,rsa-sha2-512,rsa-sha2-256,ssh-rsa,ssh-dss";
const CIPHER_PREFS: &str =
    "aes128-ctr,aes192-ctr,aes256-ctr,aes128-cbc,aes256-cbc,3des-cbc";
const MAC_PREFS: &str = "hmac-sha2-256,hmac-sha2-512,hmac-sha1,hmac-sha1-96";

impl SshSessionFactory {
    pub fn new() -> Self {
        SshSessionFactory {
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn connect(&self, device: &Device) -> Result<Ssh2Shell, PatrolError> {
        let creds = &device.credentials;
        let address = creds.address();

        let addr = address
            .to_socket_addrs()
            .map_err(|e| PatrolError::Connect {
                device: device.name.clone(),
                message: format!("Invalid address '{}': {}", address, e),
                suggestion: Some("Check the device address format".to_string()),
            })?
            .next()
            .ok_or_else(|| PatrolError::Connect {
                device: device.name.clone(),
                message: format!("Address '{}' did not resolve", address),
                suggestion: None,
            })?;

        // TCP connection with timeout
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            PatrolError::Connect {
                device: device.name.clone(),
                message: format!("Connection failed: {}", e),
                suggestion: connect_suggestion(&e),
            }
        })?;

        // SSH session
        let mut session = Session::new().map_err(|e| PatrolError::Connect {
            device: device.name.clone(),
            message: format!("Failed to create SSH session: {}", e),
            suggestion: None,
        })?;

        session.set_tcp_stream(tcp);
        session.set_timeout(self.connect_timeout.as_millis() as u32);

        for (method, prefs) in [
            (MethodType::Kex, KEX_PREFS),
            (MethodType::HostKey, HOST_KEY_PREFS),
            (MethodType::CryptCs, CIPHER_PREFS),
            (MethodType::CryptSc, CIPHER_PREFS),
            (MethodType::MacCs, MAC_PREFS),
            (MethodType::MacSc, MAC_PREFS),
        ] {
            session
                .method_pref(method, prefs)
                .map_err(|e| PatrolError::Connect {
                    device: device.name.clone(),
                    message: format!("Failed to set algorithm preferences: {}", e),
                    suggestion: None,
                })?;
        }

        session.handshake().map_err(|e| PatrolError::Connect {
            device: device.name.clone(),
            message: format!("SSH handshake failed: {}", e),
            suggestion: Some("Check SSH is reachable on the device".to_string()),
        })?;

        // Authentication: password first, keyboard-interactive fallback
        // (many network-OS builds only expose the latter)
        let mut authenticated = session
            .userauth_password(&creds.username, creds.password())
            .is_ok();

        if !authenticated {
            let mut prompter = PasswordPrompter(creds.password().to_string());
            authenticated = session
                .userauth_keyboard_interactive(&creds.username, &mut prompter)
                .is_ok();
        }

        if !authenticated {
            return Err(PatrolError::Auth {
                device: device.name.clone(),
                message: "Authentication failed".to_string(),
                suggestion: Some("Verify the device username and password".to_string()),
            });
        }

        // Interactive shell, not one-shot exec: multi-step CLI navigation
        // and pagination need a persistent session with a pty.
        let mut channel = session
            .channel_session()
            .map_err(|e| PatrolError::Channel {
                device: device.name.clone(),
                message: format!("Failed to open channel: {}", e),
            })?;

        channel
            .request_pty("vt100", None, Some((120, 500, 0, 0)))
            .map_err(|e| PatrolError::Channel {
                device: device.name.clone(),
                message: format!("Failed to request pty: {}", e),
            })?;

        channel.shell().map_err(|e| PatrolError::Channel {
            device: device.name.clone(),
            message: format!("Failed to start shell: {}", e),
        })?;

        // Streaming reads are non-blocking; writes flip back temporarily.
        session.set_blocking(false);

        Ok(Ssh2Shell {
            session,
            channel,
            closed: false,
        })
    }
}

impl Default for SshSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFactory for SshSessionFactory {
    fn open(&self, device: &Device) -> Result<Box<dyn InteractiveShell>, PatrolError> {
        Ok(Box::new(self.connect(device)?))
    }
}

/// An open ssh2 shell channel
struct Ssh2Shell {
    session: Session,
    channel: Channel,
    closed: bool,
}

impl InteractiveShell for Ssh2Shell {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.session.set_blocking(true);
        let result = self
            .channel
            .write_all(data)
            .and_then(|_| self.channel.flush());
        self.session.set_blocking(false);
        result
    }

    fn eof(&self) -> bool {
        self.channel.eof()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.session.set_blocking(true);
        self.channel.close().ok();
        self.channel.wait_close().ok();
    }
}

impl Drop for Ssh2Shell {
    fn drop(&mut self) {
        self.close();
    }
}

/// Helper for keyboard-interactive authentication
struct PasswordPrompter(String);

impl KeyboardInteractivePrompt for PasswordPrompter {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        // Return the password for each prompt (typically just one "Password:" prompt)
        prompts.iter().map(|_| self.0.clone()).collect()
    }
}
