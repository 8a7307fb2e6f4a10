use crate::agent::AgentBridge;
use crate::config::Config;
use crate::event::AppEvent;
use crate::preview::{self, ExplorerNode};
use crate::session::controller::{Command, Phase, SessionController};
use crate::session::Role;
use crate::theme::Theme;
use eframe::egui::{self, RichText, ScrollArea};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditorTab {
    Code,
    Entry,
}

pub struct VibeApp {
    rx: Receiver<AppEvent>,
    bridge: AgentBridge,
    controller: SessionController,
    config: Config,
    theme: Theme,
    theme_applied: bool,
    archive_path: String,
    initial_instruction: String,
    input_buffer: String,
    save_path: String,
    selected_file: Option<String>,
    active_tab: EditorTab,
    diagnostics_log: Vec<String>,
    scroll_to_bottom: bool,
}

impl VibeApp {
    pub fn new(rx: Receiver<AppEvent>, bridge: AgentBridge, config: Config) -> Self {
        Self {
            rx,
            bridge,
            controller: SessionController::new(),
            config,
            theme: Theme::default(),
            theme_applied: false,
            archive_path: String::new(),
            initial_instruction: String::new(),
            input_buffer: String::new(),
            save_path: String::new(),
            selected_file: None,
            active_tab: EditorTab::Code,
            diagnostics_log: Vec::new(),
            scroll_to_bottom: false,
        }
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.diagnostics_log
            .push(format!("[{}] {}", crate::session::timestamp(), message));
    }

    fn run(&mut self, command: Command) {
        let summary = match &command {
            Command::CreateSession { ticket, archive } => {
                format!("upload #{ticket}: {} ({})", archive.file_name, archive.size_label())
            }
            Command::SendInstruction { session_id, .. } => {
                format!("instruction sent to session {}", session_id.short())
            }
            Command::DeleteSession { session_id } => {
                format!("releasing session {}", session_id.short())
            }
            Command::SaveArchive { destination, .. } => {
                format!("saving archive to {}", destination.display())
            }
        };
        self.log_diagnostic(summary);
        self.bridge.dispatch(command);
    }

    fn drain_events(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        let had_session = self.controller.phase().has_session();
        let turns_before = self.controller.transcript().len();

        if let Some(command) = self.controller.apply(event) {
            self.run(command);
        }

        if self.controller.transcript().len() != turns_before {
            self.scroll_to_bottom = true;
        }
        if !had_session && self.controller.phase().has_session() {
            self.selected_file = None;
            self.active_tab = EditorTab::Code;
        }
        self.sync_selected_file();
    }

    // Keeps the code view on a path that exists in the latest snapshot.
    fn sync_selected_file(&mut self) {
        let files = self.controller.files();
        let still_present = self
            .selected_file
            .as_deref()
            .is_some_and(|path| files.contains(path));
        if !still_present {
            self.selected_file = preview::entry_file(files).map(str::to_string);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        if let Some(path) = dropped.into_iter().find_map(|file| file.path) {
            if matches!(self.controller.phase(), Phase::Idle | Phase::Closed) {
                self.archive_path = path.display().to_string();
            }
        }
    }

    fn start_upload(&mut self) {
        let path = PathBuf::from(self.archive_path.trim());
        match self
            .controller
            .begin_upload_from_path(&path, &self.initial_instruction)
        {
            Ok(command) => {
                self.initial_instruction.clear();
                self.run(command);
            }
            Err(rejection) => self.log_diagnostic(format!("upload refused: {rejection}")),
        }
    }

    fn submit_prompt(&mut self) {
        match self.controller.send_message(&self.input_buffer) {
            Ok(command) => {
                self.input_buffer.clear();
                self.scroll_to_bottom = true;
                self.run(command);
            }
            Err(rejection) => self.log_diagnostic(format!("send refused: {rejection}")),
        }
    }

    fn open_download(&mut self, ctx: &egui::Context) {
        match self.controller.download_url(self.bridge.client()) {
            Ok(url) => {
                self.log_diagnostic(format!("opening {url}"));
                ctx.open_url(egui::OpenUrl::new_tab(url));
            }
            Err(rejection) => self.log_diagnostic(format!("download refused: {rejection}")),
        }
    }

    fn save_archive(&mut self) {
        let destination = PathBuf::from(self.save_path.trim());
        if destination.as_os_str().is_empty() {
            self.log_diagnostic("save refused: choose a destination path");
            return;
        }
        match self.controller.save_archive(destination) {
            Ok(command) => self.run(command),
            Err(rejection) => self.log_diagnostic(format!("save refused: {rejection}")),
        }
    }

    fn open_preview(&mut self, ctx: &egui::Context) {
        let Some(session_id) = self.controller.session_id() else {
            return;
        };
        let root = &self.config.preview_dir;
        let dir = preview::session_dir(root, session_id);
        match preview::materialize(self.controller.files(), root, &dir) {
            Ok(entry) => {
                let url = format!("file://{}", entry.display());
                self.log_diagnostic(format!("preview written to {}", dir.display()));
                ctx.open_url(egui::OpenUrl::new_tab(url));
            }
            Err(err) => self.log_diagnostic(format!("preview failed: {err}")),
        }
    }

    fn exit_session(&mut self) {
        if let Some(command) = self.controller.exit() {
            self.run(command);
        }
        self.input_buffer.clear();
        self.save_path.clear();
        self.selected_file = None;
        self.active_tab = EditorTab::Code;
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        let phase = self.controller.phase();
        let (status, color) = match phase {
            Phase::Idle => ("No project", self.theme.text_muted),
            Phase::Uploading => ("Uploading...", self.theme.warning),
            Phase::Ready => ("Ready", self.theme.success),
            Phase::Sending => ("Agent working...", self.theme.warning),
            Phase::Closed => ("Session closed", self.theme.text_muted),
        };

        let mut download = false;
        let mut exit = false;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Vibe Editor");
                ui.separator();
                ui.label(RichText::new(status).color(color));
                if let Some(session_id) = self.controller.session_id() {
                    ui.separator();
                    ui.label(
                        RichText::new(format!("session {}", session_id.short()))
                            .color(self.theme.text_muted)
                            .small(),
                    );
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let in_session = phase.has_session();
                    exit = ui
                        .add_enabled(in_session || phase == Phase::Uploading, egui::Button::new("Exit"))
                        .clicked();
                    download = ui
                        .add_enabled(phase == Phase::Ready, egui::Button::new("Download"))
                        .clicked();
                });
            });
        });

        if download {
            self.open_download(ctx);
        }
        if exit {
            self.exit_session();
        }
    }

    fn render_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.controller.notice().cloned() else {
            return;
        };
        let color = self.theme.notice_color(notice.level);
        let mut dismiss = false;
        egui::TopBottomPanel::top("notice_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new(&notice.message).color(color));
                dismiss = ui.small_button("Dismiss").clicked();
            });
        });
        if dismiss {
            self.controller.dismiss_notice();
        }
    }

    fn render_upload_screen(&mut self, ctx: &egui::Context) {
        let uploading = self.controller.phase() == Phase::Uploading;
        let mut upload_now = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(48.0);
                ui.heading("Edit a project with the agent");
                ui.label(
                    RichText::new("Upload a .zip archive or a project folder, then describe the changes you want.")
                        .color(self.theme.text_muted),
                );
                ui.add_space(self.theme.spacing_12);

                self.theme.card_frame().show(ui, |ui| {
                    ui.set_max_width(560.0);
                    ui.label("Project archive or folder");
                    ui.add_enabled(
                        !uploading,
                        egui::TextEdit::singleline(&mut self.archive_path)
                            .desired_width(f32::INFINITY)
                            .hint_text("/path/to/project.zip (or drop it here)"),
                    );
                    ui.add_space(self.theme.spacing_8);

                    ui.label("First instruction (optional)");
                    ui.add_enabled(
                        !uploading,
                        egui::TextEdit::multiline(&mut self.initial_instruction)
                            .desired_rows(3)
                            .desired_width(f32::INFINITY)
                            .hint_text("e.g. make the hero section dark"),
                    );
                    ui.add_space(self.theme.spacing_8);

                    ui.horizontal(|ui| {
                        upload_now = ui
                            .add_enabled(
                                !uploading && !self.archive_path.trim().is_empty(),
                                egui::Button::new("Upload"),
                            )
                            .clicked();
                        if uploading {
                            ui.spinner();
                            ui.label(RichText::new("Creating session...").color(self.theme.text_muted));
                        }
                    });
                });
            });

            self.render_diagnostics(ui);
        });

        if upload_now {
            self.start_upload();
        }
    }

    fn render_explorer(&mut self, ctx: &egui::Context) {
        let tree = ExplorerNode::build(self.controller.files());
        let entry = preview::entry_file(self.controller.files()).map(str::to_string);

        egui::SidePanel::left("explorer_panel")
            .resizable(true)
            .default_width(220.0)
            .show(ctx, |ui| {
                ui.heading("Files");
                ui.label(
                    RichText::new(format!("{} files", tree.file_count()))
                        .color(self.theme.text_muted)
                        .small(),
                );
                ui.separator();
                if self.controller.files().is_empty() {
                    ui.label(RichText::new("The project is empty").color(self.theme.text_muted));
                }
                ScrollArea::vertical()
                    .id_salt("file_explorer")
                    .show(ui, |ui| {
                        render_explorer_node(ui, &tree, entry.as_deref(), &mut self.selected_file);
                    });
            });
    }

    fn render_chat_panel(&mut self, ctx: &egui::Context) {
        let sending = self.controller.is_sending();
        let mut send_now = false;

        egui::SidePanel::right("chat_panel")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                ui.heading("Chat");
                ui.separator();

                let transcript_height = (ui.available_height() - 150.0).max(120.0);
                ScrollArea::vertical()
                    .id_salt("chat_transcript")
                    .max_height(transcript_height)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        if self.controller.transcript().is_empty() {
                            ui.label(
                                RichText::new("Describe a change to get started.")
                                    .color(self.theme.text_muted),
                            );
                        }

                        for turn in self.controller.transcript().turns() {
                            let author = match turn.role {
                                Role::User => "You",
                                Role::Assistant if turn.is_error() => "Error",
                                Role::Assistant => "Agent",
                            };
                            self.theme.turn_frame(turn).show(ui, |ui| {
                                ui.set_width(ui.available_width());
                                ui.label(
                                    RichText::new(author)
                                        .color(self.theme.turn_label_color(turn))
                                        .small()
                                        .strong(),
                                );
                                ui.label(turn.content.as_str());
                            });
                            ui.add_space(self.theme.spacing_4);
                        }

                        if sending {
                            ui.horizontal(|ui| {
                                ui.spinner();
                                ui.label(
                                    RichText::new("Agent is applying your instruction...")
                                        .color(self.theme.text_muted),
                                );
                            });
                        }

                        if self.scroll_to_bottom {
                            ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                        }
                    });
                self.scroll_to_bottom = false;

                ui.separator();
                let hint = if sending {
                    "Waiting for the agent..."
                } else {
                    "Describe the next change..."
                };
                self.theme.composer_frame().show(ui, |ui| {
                    ui.horizontal(|ui| {
                        let response = ui.add_enabled(
                            !sending,
                            egui::TextEdit::singleline(&mut self.input_buffer)
                                .desired_width(ui.available_width() - 64.0)
                                .hint_text(hint),
                        );
                        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            send_now = true;
                        }

                        send_now |= ui
                            .add_enabled(
                                !sending && !self.input_buffer.trim().is_empty(),
                                egui::Button::new("Send"),
                            )
                            .clicked();
                    });
                });
            });

        if send_now && !sending {
            self.submit_prompt();
        }
    }

    fn render_workbench(&mut self, ctx: &egui::Context) {
        let mut open_preview = false;
        let mut save_now = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.active_tab, EditorTab::Code, "Code");
                ui.selectable_value(&mut self.active_tab, EditorTab::Entry, "Entry");
            });
            ui.separator();

            let body_height = (ui.available_height() - 180.0).max(160.0);
            match self.active_tab {
                EditorTab::Code => {
                    let selected = self.selected_file.clone();
                    match selected.as_deref().and_then(|path| {
                        self.controller.files().get(path).map(|content| (path, content))
                    }) {
                        Some((path, content)) => {
                            ui.label(
                                RichText::new(format!("{path}  ·  {}", preview::language_for(path)))
                                    .monospace()
                                    .color(self.theme.text_muted),
                            );
                            render_code(ui, &self.theme, content, body_height);
                        }
                        None => {
                            ui.label(RichText::new("No file selected").color(self.theme.text_muted));
                        }
                    }
                }
                EditorTab::Entry => {
                    let files = self.controller.files();
                    match preview::entry_file(files) {
                        Some(path) => {
                            ui.horizontal(|ui| {
                                ui.label(RichText::new(format!("Entry: {path}")).monospace());
                                open_preview = ui.button("Open in browser").clicked();
                            });
                            let page = preview::browser_entry(files).filter(|page| *page != path);
                            if let Some(page) = page {
                                ui.label(
                                    RichText::new(format!("Browser opens {page}"))
                                        .small()
                                        .color(self.theme.text_muted),
                                );
                            }
                            let content = self.controller.files().get(path).unwrap_or_default();
                            render_code(ui, &self.theme, content, body_height);
                        }
                        None => {
                            ui.label(
                                RichText::new("The project has no files to preview")
                                    .color(self.theme.text_muted),
                            );
                        }
                    }
                }
            }

            ui.separator();
            egui::CollapsingHeader::new("Agent log")
                .default_open(false)
                .show(ui, |ui| {
                    let log = self.controller.log();
                    if log.is_empty() {
                        ui.label(RichText::new("No log output yet").color(self.theme.text_muted));
                    } else {
                        ScrollArea::vertical()
                            .id_salt("agent_log")
                            .max_height(120.0)
                            .stick_to_bottom(true)
                            .show(ui, |ui| {
                                ui.label(RichText::new(log.as_str()).monospace().small());
                            });
                    }
                });

            ui.horizontal(|ui| {
                ui.add(
                    egui::TextEdit::singleline(&mut self.save_path)
                        .desired_width(320.0)
                        .hint_text("/path/to/result.zip"),
                );
                save_now = ui
                    .add_enabled(!self.controller.is_sending(), egui::Button::new("Save archive"))
                    .clicked();
            });

            self.render_diagnostics(ui);
        });

        if open_preview {
            self.open_preview(ctx);
        }
        if save_now {
            self.save_archive();
        }
    }

    fn render_diagnostics(&self, ui: &mut egui::Ui) {
        egui::CollapsingHeader::new("Diagnostics")
            .default_open(false)
            .show(ui, |ui| {
                ScrollArea::vertical()
                    .id_salt("diagnostics_log")
                    .max_height(90.0)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for entry in &self.diagnostics_log {
                            ui.label(RichText::new(entry).small().color(self.theme.text_muted));
                        }
                    });
            });
    }
}

fn render_code(ui: &mut egui::Ui, theme: &Theme, content: &str, height: f32) {
    theme.code_frame().show(ui, |ui| {
        ScrollArea::both()
            .id_salt("code_view")
            .max_height(height)
            .show(ui, |ui| {
                let mut text = content;
                ui.add(
                    egui::TextEdit::multiline(&mut text)
                        .code_editor()
                        .desired_width(f32::INFINITY),
                );
            });
    });
}

fn render_explorer_node(
    ui: &mut egui::Ui,
    node: &ExplorerNode,
    entry: Option<&str>,
    selected: &mut Option<String>,
) {
    for (name, child) in &node.dirs {
        egui::CollapsingHeader::new(name.as_str())
            .id_salt(ui.id().with(name))
            .default_open(true)
            .show(ui, |ui| render_explorer_node(ui, child, entry, selected));
    }

    for (name, path) in &node.files {
        let is_selected = selected.as_deref() == Some(path.as_str());
        let label = if entry == Some(path.as_str()) {
            format!("{name}  ★")
        } else {
            name.clone()
        };
        if ui.selectable_label(is_selected, label).clicked() {
            *selected = Some(path.clone());
        }
    }
}

impl eframe::App for VibeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            self.theme.apply_visuals(ctx);
            self.bridge.attach_context(ctx);
            self.theme_applied = true;
        }

        self.drain_events();
        self.handle_dropped_files(ctx);
        self.render_top_bar(ctx);
        self.render_notice(ctx);

        if self.controller.phase().has_session() {
            self.render_explorer(ctx);
            self.render_chat_panel(ctx);
            self.render_workbench(ctx);
        } else {
            self.render_upload_screen(ctx);
        }
    }
}
