use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("scale timeout")]
    Timeout,
    #[error("hx711 data-ready timeout")]
    DataReadyTimeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port: {0}")]
    Serial(String),
    #[error("no transducer attached")]
    Absent,
}

impl From<serialport::Error> for HwError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::Io(kind) => {
                HwError::Io(std::io::Error::new(kind, e.description))
            }
            _ => HwError::Serial(e.description),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
