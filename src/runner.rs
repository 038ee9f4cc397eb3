//! Application runner - drives the controller for one CLI command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use log::{debug, info};

use crate::cli::{Args, Command};
use crate::config::{self, AppSettings, PathConfig};
use crate::controller::{BookingController, Flow, NoticeLevel};
use crate::core::action_bus::{ActionBus, AppAction};
use crate::entities::{BookingDraft, GroupId, PropertyChoice, Selection};
use crate::session::Session;
use crate::sync::ThreadedDispatcher;
use crate::transport::HttpTransport;

/// Run one command against the backend.
pub fn run(args: Args, path_config: &PathConfig) -> Result<()> {
    let settings_path = config::config_file(config::SETTINGS_FILE, path_config);
    let mut settings = AppSettings::load(&settings_path)?;
    if let Some(url) = &args.api_url {
        settings.api_base_url = url.clone();
    }
    info!("Config path: {}", settings_path.display());
    info!("API: {} ({} workers)", settings.api_base_url, settings.worker_count());

    let transport = Arc::new(HttpTransport::new(&settings.api_base_url, settings.request_timeout()));
    let session_path = config::data_file(config::SESSION_FILE, path_config);

    match &args.command {
        Command::Login { username, password } => {
            let session = Session::login(transport.as_ref(), username, password)
                .map_err(|e| anyhow!(e.user_message("Login failed")))?;
            session.save(&session_path)?;
            println!("Logged in as {}", session.username);
            return Ok(());
        }
        Command::Register { username, password } => {
            Session::register(transport.as_ref(), username, password)
                .map_err(|e| anyhow!(e.user_message("Registration failed")))?;
            println!("Registered {}. Run `staycal login` next.", username.trim());
            return Ok(());
        }
        Command::Logout => {
            Session::clear(&session_path)?;
            println!("Logged out");
            return Ok(());
        }
        _ => {}
    }

    let session = Session::load(&session_path)?
        .ok_or_else(|| anyhow!("Not logged in. Run `staycal login <username> <password>` first."))?;

    let dispatcher = ThreadedDispatcher::new(transport.clone(), settings.worker_count());
    let mut app = App {
        controller: BookingController::new(transport, Box::new(dispatcher)),
        bus: ActionBus::new(),
        timeout: settings.request_timeout() + Duration::from_secs(2),
    };
    app.controller.attach(&app.bus);
    app.controller.start_session(session);
    app.settle()?;

    app.execute(args.command)
}

struct App {
    controller: BookingController,
    bus: ActionBus,
    timeout: Duration,
}

impl App {
    fn execute(&mut self, command: Command) -> Result<()> {
        debug!("Command: {:?}", command);
        match command {
            Command::Show { group, property } => {
                self.focus_group(group)?;
                if let Some(choice) = property {
                    self.controller.select_property(Some(choice))?;
                    self.settle()?;
                }
                self.print_overview();
            }
            Command::CreateGroup { name } => {
                self.open(AppAction::OpenCreateGroup)?;
                self.controller.create_group(&name);
                self.finish_flow()?;
            }
            Command::Join { code } => {
                self.open(AppAction::OpenJoinGroup)?;
                self.controller.join_group(&code);
                self.finish_flow()?;
            }
            Command::AddProperty { name, group } => {
                self.focus_group(group)?;
                self.open(AppAction::OpenAddProperty)?;
                self.controller.add_property(&name);
                self.finish_flow()?;
            }
            Command::Color { property, color, reset, group } => {
                self.focus_group(group)?;
                self.controller.edit_property_color(property.clone());
                if !matches!(self.controller.flow(), Some(Flow::EditPropertyColor { .. })) {
                    bail!("Property {} is not in the selected group", property);
                }
                match (reset, color) {
                    (true, _) => self.controller.reset_property_color(property),
                    (false, Some(color)) => self.controller.set_property_color(property, &color),
                    (false, None) => bail!("Give a color or --reset"),
                };
                self.finish_flow()?;
            }
            Command::Book { property, guest, start, end, group } => {
                self.focus_group(group)?;
                self.controller.select_property(Some(PropertyChoice::One(property)))?;
                self.settle()?;
                self.open(AppAction::OpenCreateBookingFromSidebar)?;
                let Some(Flow::CreateBooking { property, .. }) = self.controller.flow().cloned() else {
                    bail!("Could not open the booking form");
                };
                self.controller.create_booking(property, BookingDraft::new(guest, start, end));
                self.finish_flow()?;
            }
            Command::UpdateBooking { booking, guest, start, end } => {
                self.controller.update_booking(booking, BookingDraft::new(guest, start, end));
                self.finish_flow()?;
            }
            Command::DeleteBooking { booking } => {
                self.controller.delete_booking(booking);
                self.finish_flow()?;
            }
            Command::InviteCode { group } => {
                self.focus_group(group)?;
                self.open(AppAction::OpenCreateGroupCode)?;
                self.controller.create_group_code();
                self.finish_flow()?;
                if let Some(Flow::DisplayGroupCode { code, group_name }) = self.controller.flow() {
                    println!("Invite code for {}: {}", group_name, code);
                }
            }
            Command::Login { .. } | Command::Register { .. } | Command::Logout => {}
        }
        Ok(())
    }

    fn focus_group(&mut self, group: Option<GroupId>) -> Result<()> {
        if group.is_some() {
            self.controller.select_group(group)?;
            self.settle()?;
        }
        Ok(())
    }

    /// Publish a sidebar action and fail if the controller refused it.
    fn open(&mut self, action: AppAction) -> Result<()> {
        self.bus.publish_action(action);
        self.controller.process_actions();
        self.report()?;
        if self.controller.flow().is_none() {
            bail!("{} was not opened", action);
        }
        Ok(())
    }

    fn finish_flow(&mut self) -> Result<()> {
        self.settle()?;
        if let Some(message) = self.controller.flow_error() {
            bail!("{}", message);
        }
        Ok(())
    }

    /// Wait for every request, then surface notices and the error banner.
    fn settle(&mut self) -> Result<()> {
        self.controller.wait_idle(self.timeout);
        if self.controller.is_loading() {
            bail!("Timed out waiting for the server");
        }
        self.report()?;
        if let Some(error) = self.controller.error() {
            bail!("{}", error);
        }
        Ok(())
    }

    fn report(&mut self) -> Result<()> {
        let mut failure = None;
        for notice in self.controller.take_notices() {
            match notice.level {
                NoticeLevel::Success | NoticeLevel::Info => println!("{}", notice.message),
                NoticeLevel::Warning => eprintln!("Warning: {}", notice.message),
                NoticeLevel::Error => failure = Some(notice.message),
            }
        }
        match failure {
            Some(message) => bail!("{}", message),
            None => Ok(()),
        }
    }

    fn print_overview(&self) {
        let store = self.controller.store();
        let selection = self.controller.selection();

        println!("Groups:");
        for group in store.groups() {
            let mark = if selection.group() == Some(&group.id) { '*' } else { ' ' };
            println!(" {} {:<8} {}", mark, group.id.as_str(), group.name);
        }

        let Some(group) = selection.group() else {
            println!("No group selected.");
            return;
        };
        println!("Properties:");
        for property in store.properties_of(group) {
            let mark = if selection.property() == Some(&property.id) { '*' } else { ' ' };
            let color = property.explicit_color().unwrap_or("auto");
            println!(" {} {:<8} {} ({})", mark, property.id.as_str(), property.name, color);
        }

        match selection {
            Selection::AllPropertiesSelected { .. } => {
                println!("Legend:");
                for entry in self.controller.legend() {
                    println!("   {:<20} {}", entry.name, entry.background);
                }
            }
            Selection::GroupSelected { .. } => {
                println!("No properties in this group.");
                return;
            }
            _ => {}
        }

        println!("Bookings:");
        for event in self.controller.calendar_events() {
            println!(
                "   {}  {} .. {}  {}  [{}]",
                event.booking_id,
                event.start.format("%Y-%m-%d"),
                event.end.format("%Y-%m-%d"),
                event.tooltip,
                event.background
            );
        }
    }
}
